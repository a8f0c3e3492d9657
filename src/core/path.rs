//! 远端路径规范化
//!
//! OpenList 上的路径一律是以 `/` 开头、`/` 分隔的绝对路径，没有尾部 `/`
//! （根目录除外），也不含 `.` / `..` 段。

/// 默认的 OpenList 服务地址
pub const DEFAULT_BASE_URL: &str = "http://localhost:35244";

/// 词法清理路径：合并多余的 `/`，解析 `.` 和 `..`
///
/// 绝对路径中越过根的 `..` 会被丢弃；相对路径的空结果为 `"."`。
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            _ => parts.push(seg),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// 规范化为 OpenList 绝对路径，退化输入得到 `/`
pub fn normalize(path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        return "/".to_string();
    }
    if path.starts_with('/') {
        clean(path)
    } else {
        clean(&format!("/{}", path))
    }
}

/// 将相对路径拼接到根目录下，`rel` 为空时原样返回根目录
pub fn join_root(root: &str, rel: &str) -> String {
    let root = normalize(root);
    if rel.is_empty() {
        return root;
    }
    normalize(&format!("{}/{}", root, rel))
}

/// 拼接两个相对路径段
pub fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    clean(&format!("{}/{}", dir, name))
}

/// 父目录，根目录的父目录是它自己
pub fn parent(path: &str) -> String {
    let path = normalize(path);
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// 最后一段路径名
pub fn base_name(path: &str) -> String {
    let path = normalize(path);
    if path == "/" {
        return path;
    }
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// 规范化过滤规则和相对路径共用的前处理
pub fn normalize_relative(rel: &str) -> String {
    let rel = rel.trim().replace('\\', "/");
    let rel = rel.strip_prefix("./").unwrap_or(&rel);
    let rel = rel.strip_prefix('/').unwrap_or(rel);
    let cleaned = clean(rel);
    if cleaned == "." {
        String::new()
    } else {
        cleaned
    }
}

pub fn normalize_base_url(base_url: &str) -> String {
    let base_url = base_url.trim();
    let base_url = base_url.strip_suffix('/').unwrap_or(base_url);
    if base_url.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    base_url.to_string()
}
