//! 广播载荷编解码
//!
//! 载荷固定 7 字节：
//!
//! | 偏移 | 长度 | 内容 |
//! |------|------|------|
//! | 0 | 2 | 用户 ID (大端) |
//! | 2 | 1 | 年份 % 100 |
//! | 3 | 1 | 月 (1-12) |
//! | 4 | 1 | 日 (1-31) |
//! | 5 | 1 | 时 (0-23) |
//! | 6 | 1 | 分 (0-59) |
//!
//! 时间取编码时刻的本地时间，不做时区归一化。
//!
//! # 厂商数据封装
//!
//! 唯一的发送格式是 Company ID `0xFFFF` + 7 字节载荷。
//! 旧版 iOS 客户端使用 `0xAB 0xCD` 标签 + 7 字节载荷 (共 9 字节) 直接写入厂商数据，
//! 该格式只用于兼容解码，编码器不会产生。

use chrono::{Datelike, Local, Timelike};
use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BeaconError;

/// 载荷长度
pub const PAYLOAD_LEN: usize = 7;

/// 广播使用的 Company ID
pub const COMPANY_ID: u16 = 0xFFFF;

/// 旧版封装的 2 字节标签
pub const LEGACY_TAG: [u8; 2] = [0xAB, 0xCD];

/// 载荷解码错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("Invalid payload length: expected {expected}, got {got}")]
    Length { expected: usize, got: usize },

    #[error("Invalid timestamp field {field}: {value}")]
    Timestamp { field: &'static str, value: u8 },

    #[error("Unrecognized manufacturer data framing (company 0x{company_id:04X}, {len} bytes)")]
    UnknownFraming { company_id: u16, len: usize },
}

/// 用户 ID 超出 16 位时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserIdPolicy {
    /// 保留低 16 位 (补码截断)
    #[default]
    Truncate,
    /// 拒绝超出 0..=65535 的值
    Strict,
}

/// 16 位用户 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u16);

impl UserId {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// 取低 16 位，负数按补码处理
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn truncating(raw: i64) -> Self {
        Self(raw as u16)
    }

    /// 超出范围时返回 [`BeaconError::InvalidUserId`]
    pub fn strict(raw: i64) -> Result<Self, BeaconError> {
        u16::try_from(raw)
            .map(Self)
            .map_err(|_| BeaconError::InvalidUserId(raw))
    }

    pub fn with_policy(raw: i64, policy: UserIdPolicy) -> Result<Self, BeaconError> {
        match policy {
            UserIdPolicy::Truncate => Ok(Self::truncating(raw)),
            UserIdPolicy::Strict => Self::strict(raw),
        }
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl From<u16> for UserId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 编码时刻的时间快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampSnapshot {
    /// 年份 % 100
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl TimestampSnapshot {
    /// 从任意日期时间截取快照
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn capture(now: &(impl Datelike + Timelike)) -> Self {
        Self {
            year: now.year().rem_euclid(100) as u8,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
        }
    }

    /// 当前本地时间
    pub fn now() -> Self {
        Self::capture(&Local::now())
    }

    fn to_bytes(self) -> [u8; 5] {
        [self.year, self.month, self.day, self.hour, self.minute]
    }

    fn from_bytes(bytes: [u8; 5]) -> Result<Self, PayloadError> {
        let [year, month, day, hour, minute] = bytes;
        let checks: [(&'static str, u8, std::ops::RangeInclusive<u8>); 5] = [
            ("year", year, 0..=99),
            ("month", month, 1..=12),
            ("day", day, 1..=31),
            ("hour", hour, 0..=23),
            ("minute", minute, 0..=59),
        ];
        for (field, value, range) in checks {
            if !range.contains(&value) {
                return Err(PayloadError::Timestamp { field, value });
            }
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
        })
    }
}

impl fmt::Display for TimestampSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

/// 7 字节广播载荷，创建后不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdvertisingPayload([u8; PAYLOAD_LEN]);

impl AdvertisingPayload {
    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    pub fn user_id(&self) -> UserId {
        UserId(u16::from_be_bytes([self.0[0], self.0[1]]))
    }

    /// 时间字段原样返回，不做校验
    pub fn timestamp(&self) -> TimestampSnapshot {
        TimestampSnapshot {
            year: self.0[2],
            month: self.0[3],
            day: self.0[4],
            hour: self.0[5],
            minute: self.0[6],
        }
    }
}

/// 编码用户 ID 和时间快照
///
/// 纯函数，相同输入总是得到相同的 7 字节。
pub fn encode(user_id: UserId, now: &(impl Datelike + Timelike)) -> AdvertisingPayload {
    encode_snapshot(user_id, TimestampSnapshot::capture(now))
}

pub fn encode_snapshot(user_id: UserId, timestamp: TimestampSnapshot) -> AdvertisingPayload {
    let mut bytes = [0u8; PAYLOAD_LEN];
    bytes[..2].copy_from_slice(&user_id.get().to_be_bytes());
    bytes[2..].copy_from_slice(&timestamp.to_bytes());
    trace!("Encoded payload for user {}: {:02x?}", user_id, bytes);
    AdvertisingPayload(bytes)
}

/// 解码 7 字节载荷，时间字段越界视为错误
pub fn decode(bytes: &[u8]) -> Result<AdvertisingPayload, PayloadError> {
    let raw: [u8; PAYLOAD_LEN] = bytes.try_into().map_err(|_| PayloadError::Length {
        expected: PAYLOAD_LEN,
        got: bytes.len(),
    })?;
    TimestampSnapshot::from_bytes([raw[2], raw[3], raw[4], raw[5], raw[6]])?;
    Ok(AdvertisingPayload(raw))
}

/// 厂商数据的封装格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Company ID `0xFFFF` + 7 字节
    Canonical,
    /// `0xAB 0xCD` 标签 + 7 字节 (只解码)
    LegacyTagged,
}

/// 一条厂商数据 (Company ID + 数据体)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerData {
    pub company_id: u16,
    pub body: Vec<u8>,
}

impl ManufacturerData {
    /// 唯一的发送格式
    pub fn canonical(payload: &AdvertisingPayload) -> Self {
        Self {
            company_id: COMPANY_ID,
            body: payload.as_bytes().to_vec(),
        }
    }

    pub fn parse(&self) -> Result<(Framing, AdvertisingPayload), PayloadError> {
        parse_manufacturer_data(self.company_id, &self.body)
    }
}

/// 解析接收到的厂商数据
///
/// 9 字节且以 `0xAB 0xCD` 开头时按旧版格式处理 (不看 Company ID)，
/// 否则要求 Company ID 为 `0xFFFF` 且数据体为 7 字节。
pub fn parse_manufacturer_data(
    company_id: u16,
    body: &[u8],
) -> Result<(Framing, AdvertisingPayload), PayloadError> {
    if body.len() == LEGACY_TAG.len() + PAYLOAD_LEN && body.starts_with(&LEGACY_TAG) {
        return Ok((Framing::LegacyTagged, decode(&body[LEGACY_TAG.len()..])?));
    }
    if company_id == COMPANY_ID {
        return Ok((Framing::Canonical, decode(body)?));
    }
    Err(PayloadError::UnknownFraming {
        company_id,
        len: body.len(),
    })
}
