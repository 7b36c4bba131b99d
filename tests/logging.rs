#![allow(missing_docs)]

mod common;

use std::sync::{Arc, Mutex};

use hyper::Method;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

use common::test_helpers::{from_ip, harness};

#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

struct SharedGuard(Arc<Mutex<Vec<u8>>>);
impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn ban_issuance_is_logged_with_identity() {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_target(true)
        .without_time()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = harness();
    for _ in 0..15 {
        let _ = h.gate.evaluate("/api/dispute", &Method::POST, &from_ip("192.0.2.99"), None).await;
    }

    let identity = h.gate.resolver().hash_address("192.0.2.99");
    let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("client banned"), "ban should be logged: {}", logs);
    assert!(logs.contains(identity.as_str()), "log should name the hashed identity");
    assert!(!logs.contains("192.0.2.99"), "raw addresses must not be logged");
}
