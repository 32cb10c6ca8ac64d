//! Behavioral tests for the controlled reader: masking, switching and finishing

use ctrl_reader::{
    ControlledReader, FinishReason, Probe, ReaderConfig, Source, StreamState,
};
use std::collections::VecDeque;
use std::io::{Cursor, ErrorKind, Read};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

/// One scripted probe outcome
enum Step {
    Bytes(&'static [u8]),
    LastBytes(&'static [u8]),
    Nothing,
    End,
    Fail(ErrorKind),
}

/// Source driven by a queue the test can extend while the reader runs.
/// An empty queue reads as exhausted.
#[derive(Clone, Default)]
struct Scripted {
    steps: Arc<Mutex<VecDeque<Step>>>,
    probes: Arc<Mutex<usize>>,
}

impl Scripted {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            probes: Arc::default(),
        }
    }

    fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    fn probes(&self) -> usize {
        *self.probes.lock().unwrap()
    }
}

impl Source for Scripted {
    fn probe(&mut self, buf: &mut [u8]) -> Probe {
        *self.probes.lock().unwrap() += 1;
        let mut steps = self.steps.lock().unwrap();
        match steps.pop_front() {
            None | Some(Step::End) => Probe::End,
            Some(Step::Nothing) => Probe::Data(0),
            Some(Step::Fail(kind)) => Probe::Failed(std::io::Error::from(kind)),
            Some(Step::Bytes(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    steps.push_front(Step::Bytes(&bytes[n..]));
                }
                Probe::Data(n)
            }
            Some(Step::LastBytes(bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Probe::Last(n)
            }
        }
    }
}

fn config(pause_ms: u64) -> ReaderConfig {
    ReaderConfig::default().with_pause(Duration::from_millis(pause_ms))
}

/// Read until end-of-stream, returning each non-empty chunk
fn read_chunks(reader: &mut ControlledReader) -> std::io::Result<Vec<Vec<u8>>> {
    let mut chunks = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(chunks);
        }
        chunks.push(buf[..n].to_vec());
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_switch_scenario_delivers_every_byte_once() {
    let cancel = CancellationToken::new();
    let (mut reader, _stop) = ControlledReader::new(
        cancel,
        Cursor::new(b"ab".to_vec()),
        config(10).with_buffer_size(4),
    )
    .unwrap();
    let control = reader.handle();

    let consumer = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 16];
        let mut results = Vec::new();
        loop {
            let n = reader.read(&mut buf).unwrap();
            results.push(buf[..n].to_vec());
            if n == 0 {
                return results;
            }
        }
    });

    wait_until(|| control.is_source_drained()).await;
    control.switch_source(Cursor::new(b"cdef".to_vec()));
    control.allow_eof();

    let results = consumer.await.unwrap();
    assert_eq!(
        results,
        vec![b"ab".to_vec(), b"cdef".to_vec(), Vec::new()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_masked_eof_blocks_until_allowed() {
    let (mut reader, _stop) = ControlledReader::new(
        CancellationToken::new(),
        Cursor::new(Vec::new()),
        config(10),
    )
    .unwrap();
    let control = reader.handle();

    let consumer = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8];
        reader.read(&mut buf)
    });

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!consumer.is_finished());
    assert_eq!(control.state(), StreamState::MaskedEnd);
    assert!(control.is_eof_observed());

    control.allow_eof();
    let n = tokio::time::timeout(Duration::from_secs(2), consumer)
        .await
        .expect("read should end once end-of-stream is allowed")
        .unwrap();
    assert_eq!(assert_ok!(n), 0);
    assert_eq!(control.state(), StreamState::AllowedEnd);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_allow_before_exhaustion_surfaces_without_pause() {
    let (mut reader, _stop) = ControlledReader::new(
        CancellationToken::new(),
        Cursor::new(b"xyz".to_vec()),
        config(5_000),
    )
    .unwrap();
    reader.allow_eof();

    let started = Instant::now();
    let chunks = tokio::task::spawn_blocking(move || read_chunks(&mut reader))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(chunks.concat(), b"xyz");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_unblocks_parked_read() {
    let (mut reader, stop) = ControlledReader::new(
        CancellationToken::new(),
        Cursor::new(Vec::new()),
        config(5_000),
    )
    .unwrap();

    let consumer = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8];
        reader.read(&mut buf)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    stop.stop();

    let n = tokio::time::timeout(Duration::from_secs(2), consumer)
        .await
        .expect("stop should wake the parked read")
        .unwrap();
    assert_eq!(assert_ok!(n), 0);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(stop.finish_reason(), Some(FinishReason::Stopped));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_unblocks_parked_read() {
    let cancel = CancellationToken::new();
    let source = Scripted::new(vec![Step::Nothing]);
    let (mut reader, stop) =
        ControlledReader::new(cancel.clone(), source, config(5_000)).unwrap();

    let consumer = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8];
        reader.read(&mut buf)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let n = tokio::time::timeout(Duration::from_secs(2), consumer)
        .await
        .expect("cancellation should wake the parked read")
        .unwrap();
    assert_eq!(assert_ok!(n), 0);
    assert_eq!(stop.finish_reason(), Some(FinishReason::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_is_idempotent() {
    let cancel = CancellationToken::new();
    let (mut reader, stop) =
        ControlledReader::new(cancel.clone(), Cursor::new(Vec::new()), config(10)).unwrap();

    stop.stop();
    stop.clone().stop();
    cancel.cancel();
    stop.stop();

    assert_eq!(stop.finish_reason(), Some(FinishReason::Stopped));
    let mut buf = [0u8; 4];
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_data_still_flows_after_finish() {
    let (mut reader, stop) = ControlledReader::new(
        CancellationToken::new(),
        Cursor::new(b"late".to_vec()),
        config(5_000),
    )
    .unwrap();
    stop.stop();

    let chunks = tokio::task::spawn_blocking(move || read_chunks(&mut reader))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chunks.concat(), b"late");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hard_error_returned_on_first_read() {
    let source = Scripted::new(vec![Step::Fail(ErrorKind::ConnectionRefused)]);
    let probes = source.clone();
    let (mut reader, _stop) =
        ControlledReader::new(CancellationToken::new(), source, config(5_000)).unwrap();

    let started = Instant::now();
    let (result, reader) = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8];
        let result = reader.read(&mut buf);
        (result, reader)
    })
    .await
    .unwrap();

    let err = assert_err!(result);
    assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(probes.probes(), 1);
    assert!(!reader.is_eof_observed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_error_is_not_masked_even_after_allow() {
    let source = Scripted::new(vec![
        Step::Bytes(b"ok"),
        Step::Fail(ErrorKind::BrokenPipe),
        Step::Bytes(b"more"),
    ]);
    let (mut reader, _stop) =
        ControlledReader::new(CancellationToken::new(), source, config(10)).unwrap();
    reader.allow_eof();

    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 2);
    assert_eq!(
        reader.read(&mut buf).unwrap_err().kind(),
        ErrorKind::BrokenPipe
    );
    // The reader stays usable after passing an error through
    assert_eq!(reader.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"more");
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trailing_bytes_delivered_before_eof() {
    let source = Scripted::new(vec![Step::LastBytes(b"tail")]);
    let (mut reader, _stop) =
        ControlledReader::new(CancellationToken::new(), source, config(10)).unwrap();
    reader.allow_eof();

    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"tail");
    assert!(reader.is_eof_observed());
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_eof_observed_follows_latest_probe() {
    let source = Scripted::new(vec![Step::Bytes(b"x")]);
    let script = source.clone();
    let (mut reader, _stop) =
        ControlledReader::new(CancellationToken::new(), source, config(5_000)).unwrap();
    let control = reader.handle();

    let consumer = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8];
        let first = reader.read(&mut buf).unwrap();
        let observed_after_data = reader.is_eof_observed();
        let second = reader.read(&mut buf).unwrap();
        let observed_after_more = reader.is_eof_observed();
        (first, observed_after_data, second, buf[0], observed_after_more)
    });

    // The second read finds the script empty and parks with exhaustion flagged
    wait_until(|| control.is_eof_observed()).await;
    assert_eq!(control.state(), StreamState::MaskedEnd);

    // A producer with news wakes the reader without waiting out the pause
    let started = Instant::now();
    script.push(Step::Bytes(b"y"));
    control.notify_data();

    let (first, observed_after_data, second, byte, observed_after_more) =
        tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .expect("notify_data should wake the parked read")
            .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(first, 1);
    assert!(!observed_after_data);
    assert_eq!(second, 1);
    assert_eq!(byte, b'y');
    assert!(!observed_after_more);
    assert_eq!(control.state(), StreamState::Open);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nothing_yet_is_not_exhaustion() {
    let source = Scripted::new(vec![Step::Nothing, Step::Nothing, Step::Bytes(b"z")]);
    let script = source.clone();
    let (mut reader, _stop) =
        ControlledReader::new(CancellationToken::new(), source, config(10)).unwrap();
    let control = reader.handle();

    let n = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8];
        reader.read(&mut buf)
    })
    .await
    .unwrap();

    assert_eq!(assert_ok!(n), 1);
    assert_eq!(script.probes(), 3);
    assert!(!control.is_eof_observed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_switch_wakes_parked_read() {
    let (mut reader, _stop) = ControlledReader::new(
        CancellationToken::new(),
        Cursor::new(Vec::new()),
        config(5_000),
    )
    .unwrap();
    let control = reader.handle();

    let consumer = tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 8];
        let n = reader.read(&mut buf).unwrap();
        buf[..n].to_vec()
    });

    wait_until(|| control.is_source_drained()).await;
    let started = Instant::now();
    control.switch_source(Cursor::new(b"fresh".to_vec()));

    let bytes = tokio::time::timeout(Duration::from_secs(2), consumer)
        .await
        .expect("switch should wake the parked read")
        .unwrap();
    assert_eq!(bytes, b"fresh");
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_allow_right_after_switch_does_not_cut_stream() {
    let (mut reader, _stop) = ControlledReader::new(
        CancellationToken::new(),
        Cursor::new(b"one".to_vec()),
        config(10),
    )
    .unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 3);

    // The old source is exhausted but a replacement is queued, so allowing
    // end-of-stream must not end the stream before the replacement is read
    reader.switch_source(Cursor::new(b"two".to_vec()));
    reader.allow_eof();

    let chunks = tokio::task::spawn_blocking(move || read_chunks(&mut reader))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chunks.concat(), b"two");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_many_switches_preserve_order() {
    let (mut reader, _stop) = ControlledReader::new(
        CancellationToken::new(),
        Cursor::new(b"0".to_vec()),
        config(10).with_buffer_size(1),
    )
    .unwrap();
    let control = reader.handle();

    let consumer = tokio::task::spawn_blocking(move || read_chunks(&mut reader));

    for digit in 1..=5u8 {
        wait_until(|| control.is_source_drained()).await;
        control.switch_source(Cursor::new(vec![b'0' + digit]));
    }
    control.allow_eof();

    let chunks = consumer.await.unwrap().unwrap();
    assert!(chunks.iter().all(|chunk| chunk.len() == 1));
    assert_eq!(chunks.concat(), b"012345");
}

/// Cursor that records when it is dropped
struct Tracked {
    inner: Cursor<Vec<u8>>,
    dropped: Arc<Mutex<bool>>,
}

impl Read for Tracked {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        *self.dropped.lock().unwrap() = true;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replaced_source_is_handed_back_alive() {
    let dropped = Arc::new(Mutex::new(false));
    let old = Tracked {
        inner: Cursor::new(b"abXY".to_vec()),
        dropped: Arc::clone(&dropped),
    };
    let (mut reader, _stop) =
        ControlledReader::new(CancellationToken::new(), old, config(10).with_buffer_size(2))
            .unwrap();
    let control = reader.handle();

    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"ab");
    assert!(control.take_replaced().is_none());

    control.switch_source(Cursor::new(b"cd".to_vec()));
    assert_eq!(reader.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"cd");
    assert!(!*dropped.lock().unwrap());

    // The old source comes back where it was left, unread bytes included
    let mut old = control.take_replaced().expect("replaced source handed back");
    assert!(!*dropped.lock().unwrap());
    assert!(matches!(old.probe(&mut buf), Probe::Data(2)));
    assert_eq!(&buf[..2], b"XY");
    assert!(control.take_replaced().is_none());

    drop(old);
    assert!(*dropped.lock().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_superseded_replacement_is_handed_back() {
    let (mut reader, _stop) = ControlledReader::new(
        CancellationToken::new(),
        Cursor::new(b"a".to_vec()),
        config(10),
    )
    .unwrap();

    reader.switch_source(Cursor::new(b"never adopted".to_vec()));
    reader.switch_source(Cursor::new(b"b".to_vec()));
    reader.allow_eof();

    let chunks = tokio::task::spawn_blocking(move || {
        let chunks = read_chunks(&mut reader);
        (chunks, reader)
    })
    .await
    .unwrap();
    let (chunks, reader) = chunks;
    assert_eq!(chunks.unwrap().concat(), b"b");

    // Superseded first, then the source displaced on adoption
    let mut buf = [0u8; 16];
    let mut superseded = reader.take_replaced().unwrap();
    assert!(matches!(superseded.probe(&mut buf), Probe::Data(13)));
    assert_eq!(&buf[..13], b"never adopted");
    let mut displaced = reader.take_replaced().unwrap();
    assert!(matches!(displaced.probe(&mut buf), Probe::Data(1)));
    assert_eq!(buf[0], b'a');
    assert!(reader.take_replaced().is_none());
}
