//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 日志脱敏模块
//!
//! 客户端标识（通常是 IP 地址或 API Key）只能以脱敏形式写入日志。

/// 基础脱敏：保留前后各两个字符
#[inline]
pub fn redact_basic(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return "unknown".to_string();
    }

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "***".to_string();
    }

    let prefix: String = chars[..2].iter().collect();
    let suffix: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", prefix, suffix)
}

/// 客户端标识脱敏
///
/// IPv4 保留前两段，IPv6 保留第一组（首组为空的压缩写法按普通标识处理），
/// 其他标识使用 [`redact_basic`]。
#[inline]
pub fn redact_client_id(value: &str) -> String {
    let value = value.trim();
    match value.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V4(ip)) => {
            let octets = ip.octets();
            format!("{}.{}.***.***", octets[0], octets[1])
        }
        Ok(std::net::IpAddr::V6(_)) => match value.split(':').next() {
            Some(first) if !first.is_empty() => format!("{}:***:***", first),
            _ => redact_basic(value),
        },
        Err(_) => redact_basic(value),
    }
}

/// 令牌脱敏：只保留前四个字符
#[inline]
pub fn redact_token(value: &str) -> String {
    let prefix: String = value.chars().take(4).collect();
    format!("{}***", prefix)
}
