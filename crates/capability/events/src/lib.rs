//! # Gateway Events 模块
//!
//! 事件扇出与外部协作方边界：
//!
//! - [`event`]：推送消息结构（`{type, data}`）与协作方回包
//! - [`hub`]：基于 `broadcast` 的事件扇出，发布方永不阻塞
//! - [`correlator`]：按关联 ID 配对的请求/响应，带可取消的超时
//! - [`email`]：邮件通知协作方（经推送通道转发，结果原样返回）

pub mod correlator;
pub mod email;
pub mod event;
pub mod hub;

pub use correlator::{Correlator, RequestError};
pub use email::{EmailNotifier, NotifierPresence, NotifierRegistration, RemoteEmailNotifier};
pub use event::{EmailAction, EmailRequest, GatewayEvent, InboundMessage};
pub use hub::{EventHub, EventSink, NoopEventSink, RecordingEventSink};
