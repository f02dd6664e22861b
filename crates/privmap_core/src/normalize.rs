//! Canonical forms for paths and names.
//!
//! Every identity string goes through here before it is hashed or staged,
//! so that `C:\Tools\A.exe`, `"c:/tools/a.exe"` and `%SystemDrive%\tools\a.exe`
//! all land on the same node. Normalization happens before writing, never
//! after.

use std::path::PathBuf;

/// Canonical name of the local SYSTEM account.
pub const SYSTEM: &str = r"nt authority\system";

/// Normalizes a filesystem path using the process environment for
/// `%VAR%` expansion.
///
/// # Examples
///
/// ```
/// use privmap_core::normalize::normalize_path;
///
/// assert_eq!(normalize_path(r#""C:\Tools\A.EXE""#), "c:/tools/a.exe");
/// assert_eq!(normalize_path("c:/tools/"), "c:/tools");
/// assert_eq!(normalize_path("C:\\"), "c:/");
/// ```
pub fn normalize_path(raw: &str) -> String {
    normalize_path_with(raw, |name| std::env::var(name).ok())
}

/// Normalizes a filesystem path with an explicit environment lookup.
///
/// Steps: strip surrounding quotes and whitespace, expand a leading
/// `%VAR%\` prefix, unify separators to `/`, lowercase, drop a trailing
/// separator unless the path is a root.
pub fn normalize_path_with<F>(raw: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let unquoted = strip_quotes(raw);
    let expanded = expand_env(unquoted, &lookup);
    let unified = expanded.replace('\\', "/").to_lowercase();
    tidy(&unified, true)
}

/// Resolves a raw path to where it lives on this host's filesystem.
///
/// Quotes are stripped and a leading `%VAR%\` is expanded from the process
/// environment, like [`normalize_path`], but case is kept. On hosts whose
/// separator is `/`, backslashes are converted.
pub fn fs_path(raw: &str) -> PathBuf {
    fs_path_with(raw, |name| std::env::var(name).ok())
}

/// [`fs_path`] with an explicit environment lookup.
pub fn fs_path_with<F>(raw: &str, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = expand_env(strip_quotes(raw), &lookup);
    if std::path::MAIN_SEPARATOR == '/' {
        PathBuf::from(expanded.replace('\\', "/"))
    } else {
        PathBuf::from(expanded.into_owned())
    }
}

/// Normalizes a principal, runner, or symbol name.
///
/// Names keep their `domain\user` separator; only quoting, surrounding
/// whitespace, and case are normalized.
pub fn normalize_name(raw: &str) -> String {
    tidy(&strip_quotes(raw).to_lowercase(), false)
}

/// Normalizes a principal name and folds well-known aliases of the
/// built-in service accounts onto one spelling.
///
/// # Examples
///
/// ```
/// use privmap_core::normalize::canonical_principal;
///
/// assert_eq!(canonical_principal("LocalSystem"), r"nt authority\system");
/// assert_eq!(canonical_principal(r"NT AUTHORITY\SYSTEM"), r"nt authority\system");
/// assert_eq!(canonical_principal(r"CORP\alice"), r"corp\alice");
/// ```
pub fn canonical_principal(raw: &str) -> String {
    let name = normalize_name(raw);
    match name.as_str() {
        "system" | "localsystem" | r".\localsystem" | r"nt authority\localsystem" => {
            SYSTEM.to_string()
        }
        "localservice" | "local service" | r"nt authority\localservice" => {
            r"nt authority\local service".to_string()
        }
        "networkservice" | "network service" | r"nt authority\networkservice" => {
            r"nt authority\network service".to_string()
        }
        _ => name,
    }
}

/// Last component of a normalized path.
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) if i + 1 < path.len() => &path[i + 1..],
        _ => path,
    }
}

/// Parent directory of a normalized path.
///
/// Returns `None` for roots (`c:/`, `/`) and for bare names.
///
/// # Examples
///
/// ```
/// use privmap_core::normalize::parent_of;
///
/// assert_eq!(parent_of("c:/tools/a.exe").as_deref(), Some("c:/tools"));
/// assert_eq!(parent_of("c:/tools").as_deref(), Some("c:/"));
/// assert_eq!(parent_of("c:/"), None);
/// ```
pub fn parent_of(path: &str) -> Option<String> {
    if is_root(path) {
        return None;
    }
    let idx = path.rfind('/')?;
    let head = &path[..idx];
    if head.is_empty() {
        return Some("/".to_string());
    }
    if head.len() == 2 && head.ends_with(':') {
        return Some(format!("{}/", head));
    }
    Some(head.to_string())
}

/// Splits a service or task command line into (executable, arguments).
///
/// Handles quoted executables, unquoted paths containing spaces that end in
/// `.exe`, and plain `prog arg arg` forms.
///
/// # Examples
///
/// ```
/// use privmap_core::normalize::split_command_line;
///
/// let (exe, args) = split_command_line(r"C:\Program Files\Svc\svc.exe -k netsvcs");
/// assert_eq!(exe, r"C:\Program Files\Svc\svc.exe");
/// assert_eq!(args, "-k netsvcs");
/// ```
pub fn split_command_line(cmd: &str) -> (String, String) {
    let cmd = cmd.trim();
    if let Some(rest) = cmd.strip_prefix('"') {
        return match rest.find('"') {
            Some(end) => (rest[..end].to_string(), rest[end + 1..].trim().to_string()),
            None => (rest.to_string(), String::new()),
        };
    }

    let lower = cmd.to_ascii_lowercase();
    let mut search_from = 0;
    while let Some(pos) = lower[search_from..].find(".exe") {
        let end = search_from + pos + 4;
        let at_boundary = lower[end..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace);
        if at_boundary {
            return (cmd[..end].to_string(), cmd[end..].trim().to_string());
        }
        search_from = end;
    }

    match cmd.split_once(char::is_whitespace) {
        Some((exe, args)) => (exe.to_string(), args.trim().to_string()),
        None => (cmd.to_string(), String::new()),
    }
}

fn strip_quotes(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

/// Expands a leading `%NAME%` when it is followed by a backslash.
///
/// Normalized paths never contain backslashes, so a second pass never
/// expands again.
fn expand_env<'a, F>(path: &'a str, lookup: &F) -> std::borrow::Cow<'a, str>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(rest) = path.strip_prefix('%') else {
        return path.into();
    };
    let Some(end) = rest.find('%') else {
        return path.into();
    };
    let (name, remainder) = (&rest[..end], &rest[end + 1..]);
    if !remainder.starts_with('\\') {
        return path.into();
    }
    match lookup(name) {
        Some(value) => format!("{}{}", value, remainder).into(),
        None => path.into(),
    }
}

/// Trims quotes, whitespace and (for paths) a trailing separator until the
/// string stops changing.
fn tidy(s: &str, is_path: bool) -> String {
    let mut current = s;
    loop {
        let mut next = current.trim().trim_matches('"').trim();
        if is_path && next.len() > 1 && next.ends_with('/') && !is_root(next) {
            next = &next[..next.len() - 1];
        }
        if next.len() == current.len() {
            return next.to_string();
        }
        current = next;
    }
}

fn is_root(path: &str) -> bool {
    path == "/" || (path.len() == 3 && path.ends_with(":/"))
}
