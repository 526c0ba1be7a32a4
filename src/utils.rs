use chrono::Utc;
use uuid::Uuid;

/// 当前时间戳（秒）
pub fn current_timestamp() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// 生成一个随机的卷 ID
pub fn generate_uuid() -> [u8; 16] {
    Uuid::new_v4().into_bytes()
}

/// 把卷 ID 格式化成常见的 8-4-4-4-12 形式
pub fn format_uuid(bytes: &[u8; 16]) -> String {
    Uuid::from_bytes(*bytes).hyphenated().to_string()
}

/// 取出定长字段中 NUL 之前的部分
pub fn trim_nul(field: &[u8]) -> &[u8] {
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..len]
}
