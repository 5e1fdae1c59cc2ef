//! JSON 文件读写辅助

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::error::Result;

/// 编码后唯一键文件名的最大字节数，为 `.json.tmp` 后缀留出余量
pub(crate) const MAX_ENCODED_KEY_LEN: usize = 200;

/// 把唯一键（email、用户名）编码为文件名；编码后超长返回 None
pub(crate) fn encode_key(raw: &str) -> Option<String> {
    let encoded = urlencoding::encode(raw);
    (encoded.len() <= MAX_ENCODED_KEY_LEN).then(|| encoded.into_owned())
}

pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// 先写临时文件再 rename，读者不会看到写了一半的 JSON
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// 读取目录下所有 `*.json` 记录（不递归）
pub(crate) async fn list_json<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(items),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        match read_json::<T>(&path).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_keys_are_bounded() {
        assert_eq!(encode_key("stud@x.com").as_deref(), Some("stud%40x.com"));
        // 每个 é 编码为 6 字节
        let wide = format!("{}@x.com", "é".repeat(60));
        assert!(wide.len() < MAX_ENCODED_KEY_LEN);
        assert!(encode_key(&wide).is_none());
        assert!(encode_key(&"a".repeat(MAX_ENCODED_KEY_LEN)).is_some());
        assert!(encode_key(&"a".repeat(MAX_ENCODED_KEY_LEN + 1)).is_none());
    }
}
