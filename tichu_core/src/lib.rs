//! # Tichu 规则引擎
//!
//! 这个 `core` crate 包含了四人 Tichu 的全部状态管理、
//! 牌型识别与比较、计分、座位视图以及客户端-服务器通信消息的定义。
//! 它只是一个同步的状态机，与网络、计时、存储等具体实现解耦，
//! 可以被服务器、测试或自动玩家直接复用。

mod card;
mod combo;
mod config;
mod error;
mod logic;
mod message;
mod scoring;
mod state;
mod strategy;
mod view;

pub use card::*;

pub use combo::*;

pub use config::*;

pub use error::*;

pub use logic::{find_call_fulfilment, parse_call};

pub use message::*;

pub use scoring::*;

pub use state::*;

pub use strategy::*;

pub use view::*;
