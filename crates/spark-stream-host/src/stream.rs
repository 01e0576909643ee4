//! 内存流的共享状态与读取循环。
//!
//! 读取循环的每一轮：先登记唤醒，再检查队列与终态；队列为空时按需执行一次 `start`，
//! 随后调用一次 `pull`，仍无数据则等待控制器的下一次状态变化。
//! `parking_lot` 锁只在同步片段内持有，从不跨越 `await`。

use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use spark_stream_shim::{
    Chunk, ClosedState, NativeController, NativeReader, NativeSource, NativeStream, ReaderMode,
    Result, StreamError, StreamType,
};
use tokio::sync::Notify;

use crate::{controller::MemoryController, engine::EngineState, reader::MemoryReader};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Phase {
    Readable,
    Closed(ClosedState),
    Errored(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum StartPhase {
    Pending,
    Running,
    Done,
}

pub(crate) struct State {
    pub(crate) queue: VecDeque<Chunk>,
    pub(crate) phase: Phase,
    start: StartPhase,
    reader: Option<u64>,
    next_token: u64,
}

pub(crate) struct Shared {
    pub(crate) stream_type: StreamType,
    engine: Arc<EngineState>,
    source: Arc<dyn NativeSource>,
    pub(crate) state: Mutex<State>,
    pub(crate) notify: Notify,
    this: Weak<Shared>,
}

/// 队列检查的结果。
enum Poll {
    Chunk(Chunk),
    Done,
    Empty,
}

impl Shared {
    fn controller(&self) -> Arc<dyn NativeController> {
        Arc::new(MemoryController::new(self.this.clone()))
    }

    /// 状态变化后唤醒所有等待者。
    pub(crate) fn wake(&self) {
        self.notify.notify_waiters();
    }

    pub(crate) fn is_held_by(&self, token: u64) -> bool {
        self.state.lock().reader == Some(token)
    }

    pub(crate) fn release(&self, token: u64) {
        let mut state = self.state.lock();
        if state.reader == Some(token) {
            state.reader = None;
            drop(state);
            self.wake();
        }
    }

    /// 进入错误态；已处于终态时忽略。
    pub(crate) fn fail(&self, reason: String) {
        let mut state = self.state.lock();
        if state.phase == Phase::Readable {
            tracing::debug!(reason = %reason, "memory stream errored");
            state.phase = Phase::Errored(reason);
            state.queue.clear();
            drop(state);
            self.wake();
        }
    }

    /// 把未读完的尾部放回队首。
    pub(crate) fn unshift(&self, chunk: Chunk) {
        self.state.lock().queue.push_front(chunk);
    }

    fn poll_queue(&self, token: u64) -> Result<Poll> {
        let mut state = self.state.lock();
        if state.reader != Some(token) {
            return Err(StreamError::Released);
        }
        if let Some(chunk) = state.queue.pop_front() {
            return Ok(Poll::Chunk(chunk));
        }
        match &state.phase {
            Phase::Readable => Ok(Poll::Empty),
            Phase::Closed(_) => Ok(Poll::Done),
            Phase::Errored(reason) => Err(StreamError::errored(reason.clone())),
        }
    }

    async fn run_start(&self) {
        let outcome = self.source.start(self.controller()).await;
        self.state.lock().start = StartPhase::Done;
        if let Err(err) = outcome {
            self.fail(err.to_string());
        }
        self.wake();
    }

    /// 读取下一块；`None` 表示流已关闭。
    pub(crate) async fn next_chunk(&self, token: u64) -> Result<Option<Chunk>> {
        loop {
            let notified = self.notify.notified();
            match self.poll_queue(token)? {
                Poll::Chunk(chunk) => return Ok(Some(chunk)),
                Poll::Done => return Ok(None),
                Poll::Empty => {}
            }
            let start = {
                let mut state = self.state.lock();
                let observed = state.start;
                if observed == StartPhase::Pending {
                    state.start = StartPhase::Running;
                }
                observed
            };
            match start {
                StartPhase::Pending => {
                    self.run_start().await;
                    continue;
                }
                StartPhase::Running => {
                    notified.await;
                    continue;
                }
                StartPhase::Done => {}
            }
            if let Err(err) = self.source.pull(self.controller()).await {
                self.fail(err.to_string());
                continue;
            }
            notified.await;
        }
    }

    /// 取消流：清空队列、进入 `Cancelled` 终态并通知源。
    pub(crate) async fn cancel(&self, reason: Option<String>) -> Result<()> {
        let transitioned = {
            let mut state = self.state.lock();
            if let Phase::Errored(cause) = &state.phase {
                return Err(StreamError::errored(cause.clone()));
            }
            let readable = state.phase == Phase::Readable;
            if readable {
                state.phase = Phase::Closed(ClosedState::Cancelled);
                state.queue.clear();
            }
            readable
        };
        if !transitioned {
            return Ok(());
        }
        self.wake();
        self.source.cancel(reason).await
    }

    /// 等待终态；持有者释放锁且流未终结时返回 [`StreamError::Released`]。
    pub(crate) async fn closed(&self, token: u64) -> Result<ClosedState> {
        loop {
            let notified = self.notify.notified();
            {
                let state = self.state.lock();
                match &state.phase {
                    Phase::Closed(closed) => return Ok(*closed),
                    Phase::Errored(reason) => return Err(StreamError::errored(reason.clone())),
                    Phase::Readable if state.reader != Some(token) => {
                        return Err(StreamError::Released);
                    }
                    Phase::Readable => {}
                }
            }
            notified.await;
        }
    }
}

/// 内存流句柄。
pub struct MemoryStream {
    shared: Arc<Shared>,
}

impl MemoryStream {
    pub(crate) fn new(
        engine: Arc<EngineState>,
        source: Arc<dyn NativeSource>,
        stream_type: StreamType,
    ) -> Arc<Self> {
        let shared = Arc::new_cyclic(|this| Shared {
            stream_type,
            engine,
            source,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                phase: Phase::Readable,
                start: StartPhase::Pending,
                reader: None,
                next_token: 1,
            }),
            notify: Notify::new(),
            this: this.clone(),
        });
        Arc::new(Self { shared })
    }

    /// 当前排队中的块数。
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// 是否已进入终态。
    pub fn is_terminal(&self) -> bool {
        self.shared.state.lock().phase != Phase::Readable
    }

    fn lock_for(&self, mode: ReaderMode) -> Result<u64> {
        let mut state = self.shared.state.lock();
        if state.reader.is_some() {
            return Err(StreamError::Locked);
        }
        if mode == ReaderMode::Byob {
            let profile = self.shared.engine.profile();
            if !profile.native_byob {
                return Err(StreamError::construction(
                    "engine has no native byob reader",
                ));
            }
            if self.shared.stream_type != StreamType::Bytes {
                return Err(StreamError::construction(
                    "byob reader requires a byte stream",
                ));
            }
            self.shared.engine.admit_byob()?;
        }
        let token = state.next_token;
        state.next_token += 1;
        state.reader = Some(token);
        Ok(token)
    }
}

#[async_trait]
impl NativeStream for MemoryStream {
    fn stream_type(&self) -> StreamType {
        self.shared.stream_type
    }

    fn locked(&self) -> bool {
        self.shared.state.lock().reader.is_some()
    }

    fn get_reader(&self, mode: ReaderMode) -> Result<Arc<dyn NativeReader>> {
        let token = self.lock_for(mode)?;
        Ok(Arc::new(MemoryReader::new(
            Arc::clone(&self.shared),
            token,
            mode,
        )))
    }

    async fn cancel(&self, reason: Option<String>) -> Result<()> {
        if self.locked() {
            return Err(StreamError::Locked);
        }
        self.shared.cancel(reason).await
    }
}
