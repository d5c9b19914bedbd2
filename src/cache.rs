use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use bytes::Bytes;
use log::{debug, error};

use crate::exception::Exception;
use crate::util::temp_sibling;

/// 基于磁盘的写穿缓存。
///
/// 缓存条目就是 `cache/` 目录下的文件，没有内存索引。
/// 只有在缓存被禁用并且缓存文件已经存在时才直接读取缓存文件；
/// 其余情况（缓存文件缺失，或缓存处于启用状态）都会重新读取源文件并覆盖缓存。
#[derive(Debug, Clone, Copy)]
pub struct DiskCache {
    disabled: bool,
}

impl DiskCache {
    pub fn new(disabled: bool) -> Self {
        Self { disabled }
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    // 读取文件内容，必要时写入缓存
    pub fn load(&self, public_path: &Path, cache_path: &Path, id: u128) -> Result<Bytes, Exception> {
        if !cache_path.exists() || !self.disabled {
            let content = read_source(public_path, id)?;
            store(cache_path, &content, id)?;
            debug!("[ID{}](Not Cached) {}", id, public_path.display());
            Ok(content)
        } else {
            let content = read_source(cache_path, id)?;
            debug!("[ID{}](Cached) {}", id, cache_path.display());
            Ok(content)
        }
    }
}

fn read_source(path: &Path, id: u128) -> Result<Bytes, Exception> {
    let mut file = File::open(path).map_err(|e| {
        debug!("[ID{}]无法打开文件{}：{}", id, path.display(), e);
        Exception::from_source_error(&e)
    })?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).map_err(|e| {
        error!("[ID{}]无法读取文件{}：{}", id, path.display(), e);
        Exception::from_source_error(&e)
    })?;
    Ok(Bytes::from(contents))
}

// 先写临时文件再重命名，并发写同一个缓存键时读者永远看不到半截文件
fn store(cache_path: &Path, content: &[u8], id: u128) -> Result<(), Exception> {
    let tmp = temp_sibling(cache_path);
    let result = File::create(&tmp)
        .and_then(|mut f| f.write_all(content))
        .and_then(|_| fs::rename(&tmp, cache_path));
    if let Err(e) = result {
        error!("[ID{}]无法创建缓存文件{}：{}", id, cache_path.display(), e);
        let _ = fs::remove_file(&tmp);
        return Err(Exception::CacheUnwritable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn layout() -> (TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("public")).unwrap();
        fs::create_dir(dir.path().join("cache")).unwrap();
        let public = dir.path().join("public").join("a.txt");
        let cache = dir.path().join("cache").join("cpEa.txt");
        (dir, public, cache)
    }

    #[test]
    fn test_load_writes_through() {
        let (_dir, public, cache) = layout();
        fs::write(&public, b"hello").unwrap();

        let content = DiskCache::new(false).load(&public, &cache, 0).unwrap();

        assert_eq!(&content[..], b"hello");
        assert_eq!(fs::read(&cache).unwrap(), b"hello");
    }

    #[test]
    fn test_enabled_cache_rereads_every_time() {
        let (_dir, public, cache) = layout();
        let loader = DiskCache::new(false);
        fs::write(&public, b"first").unwrap();
        assert_eq!(&loader.load(&public, &cache, 0).unwrap()[..], b"first");

        fs::write(&public, b"second").unwrap();
        assert_eq!(&loader.load(&public, &cache, 1).unwrap()[..], b"second");
        assert_eq!(fs::read(&cache).unwrap(), b"second");
    }

    #[test]
    fn test_disabled_cache_with_entry_skips_public_file() {
        let (_dir, public, cache) = layout();
        fs::write(&cache, b"cached copy").unwrap();
        // 源文件根本不存在，仍应返回缓存内容
        let content = DiskCache::new(true).load(&public, &cache, 0).unwrap();
        assert_eq!(&content[..], b"cached copy");
    }

    #[test]
    fn test_disabled_cache_without_entry_populates_it() {
        let (_dir, public, cache) = layout();
        fs::write(&public, b"v1").unwrap();
        let loader = DiskCache::new(true);
        assert_eq!(&loader.load(&public, &cache, 0).unwrap()[..], b"v1");

        fs::write(&public, b"v2").unwrap();
        assert_eq!(&loader.load(&public, &cache, 1).unwrap()[..], b"v1");
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let (_dir, public, cache) = layout();
        let err = DiskCache::new(false).load(&public, &cache, 0).unwrap_err();
        assert_eq!(err, Exception::SourceUnreadable(io::ErrorKind::NotFound));
        assert_eq!(err.status_code(), 404);
        assert!(!cache.exists());
    }

    #[test]
    fn test_unwritable_cache() {
        let (dir, public, _cache) = layout();
        fs::write(&public, b"data").unwrap();
        let cache = dir.path().join("no-such-dir").join("entry");
        let err = DiskCache::new(false).load(&public, &cache, 0).unwrap_err();
        assert_eq!(err, Exception::CacheUnwritable);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (dir, public, cache) = layout();
        fs::write(&public, b"data").unwrap();
        DiskCache::new(false).load(&public, &cache, 0).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path().join("cache")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
