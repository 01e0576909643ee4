//! # spark-stream-host
//!
//! ## 定位与职责（Why）
//! - 提供 `spark-stream-shim` 宿主原语契约的内存参考实现，供测试与无原生流引擎的环境使用；
//! - 通过 [`EngineProfile`] 复现真实引擎的能力缺失与构造缺陷，验证兼容层的兜底路径。
//!
//! ## 架构嵌入（Where）
//! - `engine`：引擎入口与画像；
//! - `stream`/`reader`/`controller`：队列、锁与拉取循环；
//! - `body`：响应体与请求体，兼容层重新派生流时经由此处往返。

pub mod body;
pub mod controller;
pub mod engine;
pub mod reader;
pub mod stream;

pub use body::{Body, Request, Response};
pub use controller::MemoryController;
pub use engine::{ByobConstruction, EngineProfile, MemoryHost};
pub use reader::MemoryReader;
pub use stream::MemoryStream;
