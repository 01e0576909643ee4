//! BYOB 读取：复制仿真、原生读取与生产端应答。

mod support;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use proptest::prelude::*;
use spark_stream_host::EngineProfile;
use spark_stream_shim::{
    ByteView, Chunk, ReadableStream, ReaderMode, ReaderOptions, Result, StreamController,
    StreamError, StreamType, UnderlyingSource,
};
use support::{ScriptedSource, conforming, copying, shim_for, view_of};

async fn byob_stream(
    profile: EngineProfile,
    chunks: &[&[u8]],
) -> (ReadableStream, spark_stream_shim::Reader) {
    let shim = shim_for(profile);
    let stream =
        ReadableStream::with_type(&shim, ScriptedSource::bytes(chunks), StreamType::Bytes)
            .expect("byte stream");
    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("byob reader");
    (stream, reader)
}

#[tokio::test]
async fn small_chunk_lands_at_the_start_of_the_callers_buffer() {
    for profile in [copying(), conforming()] {
        let (_stream, reader) = byob_stream(profile, &[&[1, 2, 3]]).await;
        assert_eq!(reader.mode(), ReaderMode::Byob);
        assert_eq!(reader.is_native_byob(), profile.native_byob);

        let target = ByteView::with_capacity(10);
        let result = reader.read(Some(target.clone())).await.expect("read");
        assert!(!result.done);
        let filled = view_of(&result);
        assert_eq!(filled.to_vec(), vec![1, 2, 3]);
        assert_eq!(filled.byte_offset(), target.byte_offset());
        assert!(filled.buffer().same_buffer(target.buffer()));
    }
}

#[tokio::test]
async fn emulation_truncates_and_drops_the_tail() {
    let (_stream, reader) = byob_stream(copying(), &[&[1, 2, 3, 4, 5]]).await;
    assert!(!reader.is_native_byob());

    let first = reader
        .read(Some(ByteView::with_capacity(2)))
        .await
        .expect("read");
    assert_eq!(view_of(&first).to_vec(), vec![1, 2]);

    let second = reader
        .read(Some(ByteView::with_capacity(2)))
        .await
        .expect("read");
    assert!(second.done, "remaining bytes are not recoverable");
}

#[tokio::test]
async fn native_byob_keeps_the_tail_for_the_next_read() {
    let (_stream, reader) = byob_stream(conforming(), &[&[1, 2, 3, 4, 5]]).await;
    assert!(reader.is_native_byob());

    let mut collected = Vec::new();
    loop {
        let result = reader
            .read(Some(ByteView::with_capacity(2)))
            .await
            .expect("read");
        if result.done {
            break;
        }
        collected.push(view_of(&result).to_vec());
    }
    assert_eq!(collected, vec![vec![1, 2], vec![3, 4], vec![5]]);
}

#[tokio::test]
async fn end_of_stream_hands_back_the_original_view() {
    let (_stream, reader) = byob_stream(copying(), &[]).await;
    let target = ByteView::with_capacity(10);
    let result = reader.read(Some(target.clone())).await.expect("read");
    assert!(result.done);
    let returned = view_of(&result);
    assert!(returned.buffer().same_buffer(target.buffer()));
    assert_eq!(returned.byte_length(), 10);
}

#[tokio::test]
async fn read_without_a_view_is_a_plain_read() {
    let (_stream, reader) = byob_stream(copying(), &[&[9, 9, 9]]).await;
    let result = reader.read(None).await.expect("read");
    assert_eq!(view_of(&result).to_vec(), vec![9, 9, 9]);
}

#[tokio::test]
async fn non_byte_chunk_degrades_to_the_chunk_itself() {
    let shim = shim_for(copying());
    let stream = ReadableStream::new(&shim, ScriptedSource::new(["text"])).expect("stream");
    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("byob reader");
    assert_eq!(stream.mode(), ReaderMode::Byob);

    let result = reader
        .read(Some(ByteView::with_capacity(8)))
        .await
        .expect("degraded read still succeeds");
    assert_eq!(result.value, Some(Chunk::from("text")));
}

/// 通过 `byob_request` 直接写入调用方缓冲区的生产端，并记录第二次应答的结果。
#[derive(Default)]
struct RespondingSource {
    replace_view: bool,
    second_attempt: Mutex<Option<Result<()>>>,
    saw_request: Mutex<bool>,
}

#[async_trait]
impl UnderlyingSource for RespondingSource {
    async fn pull(&self, controller: &StreamController) -> Result<()> {
        let Some(request) = controller.byob_request() else {
            return controller.close();
        };
        let Some(view) = request.view() else {
            return controller.close();
        };
        *self.saw_request.lock() = true;
        if self.replace_view {
            request.respond_with_new_view(ByteView::from_slice(&[4, 4]))?;
        } else {
            view.write(0, &[7, 8, 9])?;
            request.respond(3)?;
        }
        let again = controller.byob_request().map(|retry| retry.respond(1));
        *self.second_attempt.lock() = again;
        Ok(())
    }
}

async fn respond_once(
    profile: EngineProfile,
    replace_view: bool,
) -> (ByteView, ByteView, Arc<RespondingSource>) {
    let shim = shim_for(profile);
    let source = Arc::new(RespondingSource {
        replace_view,
        ..RespondingSource::default()
    });
    let stream =
        ReadableStream::with_type(&shim, SharedSource(source.clone()), StreamType::Bytes)
            .expect("byte stream");
    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("byob reader");
    let target = ByteView::with_capacity(10);
    let result = reader.read(Some(target.clone())).await.expect("read");
    (target, view_of(&result), source)
}

struct SharedSource(Arc<RespondingSource>);

#[async_trait]
impl UnderlyingSource for SharedSource {
    async fn pull(&self, controller: &StreamController) -> Result<()> {
        self.0.pull(controller).await
    }
}

#[tokio::test]
async fn producer_fills_the_pending_view_through_respond() {
    for profile in [copying(), conforming()] {
        let (target, filled, source) = respond_once(profile, false).await;
        assert!(*source.saw_request.lock());
        assert_eq!(filled.to_vec(), vec![7, 8, 9]);
        assert!(filled.buffer().same_buffer(target.buffer()));
        assert_eq!(
            *source.second_attempt.lock(),
            Some(Err(StreamError::AlreadyResponded))
        );
    }
}

#[tokio::test]
async fn respond_with_new_view_substitutes_the_buffer_contents() {
    let (target, filled, source) = respond_once(copying(), true).await;
    assert_eq!(filled.to_vec(), vec![4, 4]);
    assert!(filled.buffer().same_buffer(target.buffer()));
    assert_eq!(
        *source.second_attempt.lock(),
        Some(Err(StreamError::AlreadyResponded))
    );
}

#[tokio::test]
async fn pending_views_are_cleared_after_each_read() {
    let shim = shim_for(copying());
    let stream =
        ReadableStream::with_type(&shim, ScriptedSource::bytes(&[&[1], &[2]]), StreamType::Bytes)
            .expect("byte stream");
    let reader = stream
        .get_reader(ReaderOptions::byob())
        .await
        .expect("byob reader");
    reader
        .read(Some(ByteView::with_capacity(4)))
        .await
        .expect("read");
    assert_eq!(shim.pending_views(), 0);
    assert!(reader.cached_view().is_none());
}

/// 第一次 `pull` 永不完成；之后经 `byob_request` 写入待填充视图。
#[derive(Default)]
struct StallingSource {
    pulls: AtomicUsize,
}

#[async_trait]
impl UnderlyingSource for StallingSource {
    async fn pull(&self, controller: &StreamController) -> Result<()> {
        if self.pulls.fetch_add(1, Ordering::SeqCst) == 0 {
            futures::future::pending::<()>().await;
        }
        let Some(request) = controller.byob_request() else {
            return controller.close();
        };
        let Some(view) = request.view() else {
            return controller.close();
        };
        view.write(0, &[5, 6])?;
        request.respond(2)
    }
}

#[tokio::test]
async fn interrupted_read_resumes_with_the_cached_view() {
    for profile in [copying(), conforming()] {
        let shim = shim_for(profile);
        let stream =
            ReadableStream::with_type(&shim, StallingSource::default(), StreamType::Bytes)
                .expect("byte stream");
        let reader = stream
            .get_reader(ReaderOptions::byob())
            .await
            .expect("byob reader");

        let target = ByteView::with_capacity(8);
        let interrupted = reader.read(Some(target.clone())).now_or_never();
        assert!(interrupted.is_none(), "first pull never completes");
        let cached = reader.cached_view().expect("view outlives the dropped read");
        assert!(cached.buffer().same_buffer(target.buffer()));
        assert_eq!(shim.pending_views(), 0);

        let result = reader.read(None).await.expect("resumed read");
        let filled = view_of(&result);
        assert_eq!(filled.to_vec(), vec![5, 6]);
        assert!(filled.buffer().same_buffer(target.buffer()));
        assert_eq!(filled.byte_offset(), target.byte_offset());
        assert!(reader.cached_view().is_none());
    }
}

proptest! {
    #[test]
    fn emulated_copy_is_a_prefix_over_the_callers_buffer(
        chunk in proptest::collection::vec(any::<u8>(), 1..64),
        capacity in 1_usize..64,
    ) {
        let (filled, target) = futures::executor::block_on(async {
            let (_stream, reader) = byob_stream(copying(), &[chunk.as_slice()]).await;
            let target = ByteView::with_capacity(capacity);
            let result = reader.read(Some(target.clone())).await.expect("read");
            (view_of(&result), target)
        });
        let expected = chunk.len().min(capacity);
        prop_assert_eq!(filled.byte_length(), expected);
        prop_assert_eq!(filled.to_vec(), chunk[..expected].to_vec());
        prop_assert!(filled.buffer().same_buffer(target.buffer()));
        prop_assert_eq!(filled.byte_offset(), 0);
    }
}
