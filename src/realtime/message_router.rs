// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::domain::models::event::{ConnectionPayload, InboundEvent, ScrapingStatusPayload};
use crate::infrastructure::metrics::{FRAMES_DROPPED, STATUS_EVENTS};
use crate::state::status_store::{StatusStore, UpsertOutcome};

const FORWARD_CHANNEL_CAPACITY: usize = 128;

/// 帧被丢弃的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    #[error("frame is not valid JSON: {0}")]
    NotJson(String),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("invalid `{kind}` payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
    #[error("binary frame is not UTF-8")]
    Binary,
}

impl DropReason {
    fn label(&self) -> &'static str {
        match self {
            DropReason::NotJson(_) => "not_json",
            DropReason::NotAnObject => "not_object",
            DropReason::MissingType => "missing_type",
            DropReason::InvalidPayload { .. } => "invalid_payload",
            DropReason::Binary => "binary",
        }
    }
}

/// 路由结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// 服务端分配了连接ID，需要连接管理器处理
    ConnectionAssigned(String),
    /// 心跳流量，不转发
    KeepaliveAck,
    /// 站点状态已写入存储
    StatusApplied {
        site: String,
        outcome: UpsertOutcome,
    },
    /// 未识别的事件已转发给订阅者
    Forwarded(String),
    /// 帧已丢弃
    Dropped(DropReason),
}

/// 转发给订阅者的未识别事件
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedEvent {
    /// 原始 `type` 字段
    pub kind: String,
    /// 完整信封
    pub payload: Value,
}

/// 将原始帧解码为类型化事件
pub fn decode(raw: &str) -> Result<InboundEvent, DropReason> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DropReason::NotJson(e.to_string()))?;
    if !value.is_object() {
        return Err(DropReason::NotAnObject);
    }
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DropReason::MissingType)?
        .to_string();

    match kind.as_str() {
        "connection" => {
            let payload: ConnectionPayload = serde_json::from_value(value)
                .map_err(|e| invalid_payload(&kind, e.to_string()))?;
            Ok(InboundEvent::Connection {
                connection_id: payload.connection_id,
            })
        }
        "pong" | "ping" => Ok(InboundEvent::Pong),
        "scraping_status" => {
            let payload: ScrapingStatusPayload = serde_json::from_value(value)
                .map_err(|e| invalid_payload(&kind, e.to_string()))?;
            if payload.target_site.trim().is_empty() {
                return Err(invalid_payload(&kind, "empty target_site".to_string()));
            }
            Ok(InboundEvent::ScrapingStatus {
                target_site: payload.target_site,
                status: payload.data,
            })
        }
        _ => Ok(InboundEvent::Unknown {
            kind,
            payload: value,
        }),
    }
}

fn invalid_payload(kind: &str, reason: String) -> DropReason {
    DropReason::InvalidPayload {
        kind: kind.to_string(),
        reason,
    }
}

/// 消息路由器
///
/// 解码入站帧并分发：站点状态写入存储，连接握手交给连接管理器，
/// 未识别类型转发给订阅者。任何格式错误的帧都只记录日志后丢弃，不影响连接。
pub struct MessageRouter {
    store: Arc<StatusStore>,
    forwarded: broadcast::Sender<ForwardedEvent>,
}

impl MessageRouter {
    pub fn new(store: Arc<StatusStore>) -> Self {
        let (forwarded, _) = broadcast::channel(FORWARD_CHANNEL_CAPACITY);
        Self { store, forwarded }
    }

    /// 订阅未识别类型的事件
    pub fn subscribe_forwarded(&self) -> broadcast::Receiver<ForwardedEvent> {
        self.forwarded.subscribe()
    }

    pub fn store(&self) -> &Arc<StatusStore> {
        &self.store
    }

    /// 路由一个文本帧
    pub fn route(&self, raw: &str) -> RouteOutcome {
        match decode(raw) {
            Ok(event) => self.dispatch(event),
            Err(reason) => self.drop_frame(reason, raw),
        }
    }

    /// 路由一个二进制帧，仅接受 UTF-8 文本
    pub fn route_binary(&self, raw: &[u8]) -> RouteOutcome {
        match std::str::from_utf8(raw) {
            Ok(text) => self.route(text),
            Err(_) => self.drop_frame(DropReason::Binary, ""),
        }
    }

    /// 分发已解码的事件
    pub fn dispatch(&self, event: InboundEvent) -> RouteOutcome {
        match event {
            InboundEvent::Connection { connection_id } => {
                debug!("Server assigned connection id {}", connection_id);
                RouteOutcome::ConnectionAssigned(connection_id)
            }
            InboundEvent::Pong => {
                trace!("Keepalive acknowledged");
                RouteOutcome::KeepaliveAck
            }
            InboundEvent::ScrapingStatus {
                target_site,
                status,
            } => {
                counter!(STATUS_EVENTS, "site" => target_site.clone()).increment(1);
                let outcome = self.store.upsert(&target_site, status);
                debug!("Status event for {}: {:?}", target_site, outcome);
                RouteOutcome::StatusApplied {
                    site: target_site,
                    outcome,
                }
            }
            InboundEvent::Unknown { kind, payload } => {
                trace!("Forwarding event of type {}", kind);
                // No subscribers is fine
                let _ = self.forwarded.send(ForwardedEvent {
                    kind: kind.clone(),
                    payload,
                });
                RouteOutcome::Forwarded(kind)
            }
        }
    }

    fn drop_frame(&self, reason: DropReason, raw: &str) -> RouteOutcome {
        counter!(FRAMES_DROPPED, "reason" => reason.label()).increment(1);
        let preview: String = raw.chars().take(200).collect();
        warn!("Dropping inbound frame ({}): {}", reason, preview);
        RouteOutcome::Dropped(reason)
    }
}
