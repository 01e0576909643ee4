//! 内存流的生产端控制器。

use std::sync::Weak;

use spark_stream_shim::{Chunk, NativeController, Result, StreamError, StreamType};

use crate::stream::{Phase, Shared};

/// 以弱引用指向流，流被销毁后所有操作返回 [`StreamError::Closed`]。
pub struct MemoryController {
    shared: Weak<Shared>,
}

impl MemoryController {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }
}

impl NativeController for MemoryController {
    fn enqueue(&self, chunk: Chunk) -> Result<()> {
        let shared = self.shared.upgrade().ok_or(StreamError::Closed)?;
        if shared.stream_type == StreamType::Bytes && chunk.as_view().is_none() {
            return Err(StreamError::NotBytes {
                found: chunk.type_name(),
            });
        }
        {
            let mut state = shared.state.lock();
            if state.phase != Phase::Readable {
                return Err(StreamError::invalid_state(
                    "cannot enqueue into a stream that is not readable",
                ));
            }
            state.queue.push_back(chunk);
        }
        shared.wake();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let shared = self.shared.upgrade().ok_or(StreamError::Closed)?;
        {
            let mut state = shared.state.lock();
            if state.phase != Phase::Readable {
                return Err(StreamError::invalid_state("stream is already closing or errored"));
            }
            state.phase = Phase::Closed(spark_stream_shim::ClosedState::Closed);
        }
        shared.wake();
        Ok(())
    }

    fn error(&self, reason: String) {
        if let Some(shared) = self.shared.upgrade() {
            shared.fail(reason);
        }
    }

    fn desired_size(&self) -> Option<i64> {
        let shared = self.shared.upgrade()?;
        let state = shared.state.lock();
        match state.phase {
            Phase::Readable => Some(1 - state.queue.len() as i64),
            Phase::Closed(_) => Some(0),
            Phase::Errored(_) => None,
        }
    }
}
