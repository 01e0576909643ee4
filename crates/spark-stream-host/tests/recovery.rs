//! 字节模式构造失败后的重新派生。

mod support;

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use spark_stream_host::{EngineProfile, MemoryHost};
use spark_stream_shim::{
    ByteView, ClosedState, HostCapabilities, NativeHost, NativeReader, NativeSource, NativeStream,
    ReadableStream, ReaderMode, ReaderOptions, Result, Shim, ShimConfig, StreamError, StreamType,
};
use support::{ScriptedSource, conforming, shim_for, shim_with, view_of};

async fn drain(reader: &spark_stream_shim::Reader) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    loop {
        let result = reader
            .read(Some(ByteView::with_capacity(16)))
            .await
            .expect("read");
        if result.done {
            return chunks;
        }
        chunks.push(view_of(&result).to_vec());
    }
}

#[tokio::test]
async fn always_failing_byob_construction_succeeds_by_the_third_attempt() {
    let shim = shim_for(EngineProfile::broken_byob());
    let stream = ReadableStream::with_type(
        &shim,
        ScriptedSource::bytes(&[b"hello", b"world"]),
        StreamType::Bytes,
    )
    .expect("byte stream");

    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("forced byob reader");
    assert_eq!(stream.attempts(), 3);
    assert!(reader.is_byob());
    assert!(!reader.is_native_byob());
    assert_eq!(stream.mode(), ReaderMode::Byob);
    assert_eq!(stream.stream_type(), StreamType::Bytes);

    assert_eq!(drain(&reader).await, vec![b"hello".to_vec(), b"world".to_vec()]);
}

#[tokio::test]
async fn flaky_construction_recovers_on_the_first_rederivation() {
    let shim = shim_for(EngineProfile::flaky_byob(1));
    let stream =
        ReadableStream::with_type(&shim, ScriptedSource::bytes(&[b"abc"]), StreamType::Bytes)
            .expect("byte stream");

    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("byob reader");
    assert_eq!(stream.attempts(), 1);
    assert!(reader.is_native_byob());
    assert_eq!(drain(&reader).await, vec![b"abc".to_vec()]);
}

#[tokio::test]
async fn default_stream_is_rederived_into_a_byte_stream() {
    let shim = shim_for(conforming());
    let stream = ReadableStream::new(&shim, ScriptedSource::new(["text", "more"])).expect("stream");
    let original = stream.native();

    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("byob reader");
    assert_eq!(stream.attempts(), 1);
    assert!(reader.is_native_byob());
    assert!(original.locked(), "materialization locks the original stream");
    assert_eq!(stream.native().stream_type(), StreamType::Bytes);
    assert_eq!(drain(&reader).await, vec![b"text".to_vec(), b"more".to_vec()]);
}

#[tokio::test]
async fn lower_bound_forces_emulation_sooner() {
    let shim = shim_with(
        EngineProfile::broken_byob(),
        ShimConfig::default().with_max_derivation_attempts(1),
    );
    let stream =
        ReadableStream::with_type(&shim, ScriptedSource::bytes(&[b"x"]), StreamType::Bytes)
            .expect("byte stream");
    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("forced byob reader");
    assert_eq!(stream.attempts(), 1);
    assert!(!reader.is_native_byob());
}

#[tokio::test]
async fn forced_polyfills_skip_native_byob() {
    let shim = shim_with(conforming(), ShimConfig::default().with_force_polyfills(true));
    let stream =
        ReadableStream::with_type(&shim, ScriptedSource::bytes(&[b"xyz"]), StreamType::Bytes)
            .expect("byte stream");
    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("emulated reader");
    assert_eq!(stream.attempts(), 0);
    assert!(!reader.is_native_byob());
}

#[tokio::test]
async fn locked_stream_is_not_recovered() {
    let shim = shim_for(EngineProfile::broken_byob());
    let stream =
        ReadableStream::with_type(&shim, ScriptedSource::bytes(&[b"x"]), StreamType::Bytes)
            .expect("byte stream");
    let _held = stream
        .get_reader(ReaderOptions::default())
        .await
        .expect("default reader");

    let err = stream.get_reader(ReaderOptions::byob()).await.err();
    assert_eq!(err, Some(StreamError::Locked));
    assert_eq!(stream.attempts(), 0);
}

/// 任何 Reader 构造都失败的宿主，记录物化次数。
#[derive(Default)]
struct RefusingHost {
    materializations: AtomicU32,
}

impl RefusingHost {
    fn materializations(&self) -> u32 {
        self.materializations.load(Ordering::SeqCst)
    }
}

struct RefusingStream;

#[async_trait]
impl NativeStream for RefusingStream {
    fn stream_type(&self) -> StreamType {
        StreamType::Bytes
    }

    fn locked(&self) -> bool {
        false
    }

    fn get_reader(&self, _mode: ReaderMode) -> Result<Arc<dyn NativeReader>> {
        Err(StreamError::construction("engine refused the reader"))
    }

    async fn cancel(&self, _reason: Option<String>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl NativeHost for RefusingHost {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            native_byob: true,
            byte_streams: true,
        }
    }

    fn construct(
        &self,
        _source: Arc<dyn NativeSource>,
        _stream_type: StreamType,
    ) -> Result<Arc<dyn NativeStream>> {
        Ok(Arc::new(RefusingStream))
    }

    async fn materialize(&self, _stream: Arc<dyn NativeStream>) -> Result<Arc<dyn NativeStream>> {
        self.materializations.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(RefusingStream))
    }
}

/// 构造交给内存引擎，物化确实消费原流，但交回的新流拒绝一切 Reader。
struct DegradingHost {
    engine: MemoryHost,
}

#[async_trait]
impl NativeHost for DegradingHost {
    fn capabilities(&self) -> HostCapabilities {
        self.engine.capabilities()
    }

    fn construct(
        &self,
        source: Arc<dyn NativeSource>,
        stream_type: StreamType,
    ) -> Result<Arc<dyn NativeStream>> {
        self.engine.construct(source, stream_type)
    }

    async fn materialize(&self, stream: Arc<dyn NativeStream>) -> Result<Arc<dyn NativeStream>> {
        self.engine.materialize(stream).await?;
        Ok(Arc::new(RefusingStream))
    }
}

fn refused() -> Box<StreamError> {
    Box::new(StreamError::construction("engine refused the reader"))
}

#[tokio::test]
async fn exhausted_recovery_reports_the_last_failure() {
    let host = Arc::new(RefusingHost::default());
    let shim = Shim::new(host.clone());
    let stream =
        ReadableStream::with_type(&shim, ScriptedSource::bytes(&[b"x"]), StreamType::Bytes)
            .expect("byte stream");

    let err = stream
        .get_reader(ReaderOptions::byob())
        .await
        .err()
        .expect("recovery gives up");
    assert_eq!(
        err,
        StreamError::RecoveryExhausted {
            attempts: 3,
            last: refused(),
        }
    );
    assert_eq!(host.materializations(), 3);
}

#[tokio::test]
async fn default_reader_on_a_byte_stream_stops_at_the_bound() {
    let host = Arc::new(RefusingHost::default());
    let shim = Shim::new(host.clone());
    let stream =
        ReadableStream::with_type(&shim, ScriptedSource::bytes(&[b"x"]), StreamType::Bytes)
            .expect("byte stream");

    let err = stream.values().await.err().expect("iteration cannot start");
    assert_eq!(
        err,
        StreamError::RecoveryExhausted {
            attempts: 3,
            last: refused(),
        }
    );
    assert_eq!(host.materializations(), 3);
    assert_eq!(stream.attempts(), 3);
    assert_eq!(stream.mode(), ReaderMode::Default);
}

#[tokio::test]
async fn failed_recovery_keeps_the_derived_stream_and_its_count() {
    let host = Arc::new(DegradingHost {
        engine: MemoryHost::new(EngineProfile::broken_byob()),
    });
    let shim = Shim::new(host);
    let stream =
        ReadableStream::with_type(&shim, ScriptedSource::bytes(&[b"x"]), StreamType::Bytes)
            .expect("byte stream");
    let original = stream.native();

    let first = stream.get_reader(ReaderOptions::byob()).await.err();
    assert_eq!(
        first,
        Some(StreamError::RecoveryExhausted {
            attempts: 3,
            last: refused(),
        })
    );
    assert_eq!(stream.attempts(), 3);
    assert_eq!(stream.mode(), ReaderMode::Byob);
    assert!(!Arc::ptr_eq(&original, &stream.native()));
    assert!(!stream.locked());

    let second = stream.get_reader(ReaderOptions::byob()).await.err();
    assert_eq!(
        second,
        Some(StreamError::RecoveryExhausted {
            attempts: 3,
            last: refused(),
        })
    );
    assert_eq!(stream.attempts(), 3);
}

#[tokio::test]
async fn recovered_reader_terminates_cleanly() {
    let shim = shim_for(EngineProfile::broken_byob());
    let stream = ReadableStream::with_type(
        &shim,
        ScriptedSource::bytes(&[b"a", b"b"]),
        StreamType::Bytes,
    )
    .expect("byte stream");
    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("forced byob reader");

    assert_eq!(reader.async_dispose(None).await, Some(ClosedState::Cancelled));
    assert!(!stream.locked());
}
