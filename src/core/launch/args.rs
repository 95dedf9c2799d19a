// ─── Launch Arguments ───
// Placeholder substitution and flag bookkeeping for JVM and game arguments.

use std::collections::HashMap;

/// `${name}` → value table for argument templates.
#[derive(Debug, Default, Clone)]
pub struct Placeholders {
    values: HashMap<&'static str, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name, value.into());
        self
    }

    pub fn resolve(&self, raw: &str) -> String {
        let mut resolved = raw.to_string();
        for (name, value) in &self.values {
            let token = format!("${{{name}}}");
            if resolved.contains(&token) {
                resolved = resolved.replace(&token, value);
            }
        }
        resolved
    }
}

/// Resolve every argument. Unresolvable ones are dropped together with the
/// option that introduces them.
pub fn substitute_args(raw_args: &[String], placeholders: &Placeholders) -> Vec<String> {
    let mut sanitized = Vec::with_capacity(raw_args.len());
    for arg in raw_args {
        let resolved = placeholders.resolve(arg);
        if resolved.contains("${") {
            drop_dangling_option(&mut sanitized);
            continue;
        }
        sanitized.push(resolved);
    }
    sanitized
}

/// Remove `-cp`/`-classpath` and their values; the backend injects its own.
pub fn strip_classpath_switches(args: Vec<String>) -> Vec<String> {
    let mut kept = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "-cp" || arg == "-classpath" || arg == "--class-path" {
            let _ = iter.next();
            continue;
        }
        kept.push(arg);
    }
    kept
}

pub fn drop_dangling_option(args: &mut Vec<String>) {
    if args.last().is_some_and(|last| last.starts_with('-')) {
        let _ = args.pop();
    }
}

/// Drop `--width`/`--height` pairs whose value is not a number.
pub fn sanitize_numeric_window_args(args: Vec<String>) -> Vec<String> {
    let mut sanitized = Vec::with_capacity(args.len());
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];
        if arg == "--width" || arg == "--height" {
            let Some(value) = args.get(i + 1) else {
                i += 1;
                continue;
            };

            if value.starts_with('-') || value.parse::<u32>().is_err() {
                i += 1;
                continue;
            }

            sanitized.push(arg.clone());
            sanitized.push(value.clone());
            i += 2;
            continue;
        }

        sanitized.push(arg.clone());
        i += 1;
    }

    sanitized
}

pub fn contains_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

/// Flags Forge needs on Java 9+ to reach into JDK internals.
pub fn modern_forge_jvm_arg_pairs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("--add-modules", "ALL-SYSTEM"),
        ("--add-opens", "java.base/java.util.jar=ALL-UNNAMED"),
        ("--add-opens", "java.base/java.lang=ALL-UNNAMED"),
        ("--add-opens", "java.base/java.util=ALL-UNNAMED"),
        ("--add-opens", "java.base/java.lang.invoke=ALL-UNNAMED"),
        ("--add-opens", "java.base/java.lang.reflect=ALL-UNNAMED"),
        ("--add-opens", "java.base/java.nio.file=ALL-UNNAMED"),
        ("--add-opens", "java.base/sun.security.util=ALL-UNNAMED"),
        ("--add-exports", "java.base/sun.security.action=ALL-UNNAMED"),
        ("--add-opens", "java.base/java.io=ALL-UNNAMED"),
        ("--add-opens", "java.base/java.net=ALL-UNNAMED"),
        ("--add-opens", "java.base/sun.nio.ch=ALL-UNNAMED"),
    ]
}

/// Append `flag value` unless present as a pair or as `flag=value`.
pub fn ensure_jvm_arg_pair_present(args: &mut Vec<String>, flag: &str, value: &str) {
    let combined = format!("{}={}", flag, value);
    if args.iter().any(|arg| arg == &combined) {
        return;
    }
    if args.windows(2).any(|pair| pair[0] == flag && pair[1] == value) {
        return;
    }

    args.push(flag.to_string());
    args.push(value.to_string());
}

pub fn ensure_jvm_arg_present(args: &mut Vec<String>, arg: &str) {
    if !contains_flag(args, arg) {
        args.push(arg.to_string());
    }
}

/// Replace any existing `-D{property}=` with the given value.
pub fn set_jvm_system_property(args: &mut Vec<String>, property: &str, value: &str) {
    let prefix = format!("-D{}=", property);
    args.retain(|arg| !arg.starts_with(&prefix));
    args.push(format!("{}{}", prefix, value));
}

/// Append `extra` to `args`, skipping entries or `flag value` pairs already present.
pub fn merge_unique(args: &mut Vec<String>, extra: &[String]) {
    let mut i = 0;
    while i < extra.len() {
        let arg = &extra[i];
        let takes_value = arg.starts_with("--")
            && !arg.contains('=')
            && extra.get(i + 1).is_some_and(|next| !next.starts_with('-'));
        if takes_value {
            ensure_jvm_arg_pair_present(args, arg, &extra[i + 1]);
            i += 2;
            continue;
        }
        ensure_jvm_arg_present(args, arg);
        i += 1;
    }
}

/// `value` first, then the current contents of `var_name`.
pub fn append_env_path(var_name: &str, value: &str) -> String {
    let separator = if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    };
    match std::env::var(var_name) {
        Ok(existing) if !existing.trim().is_empty() => {
            format!("{}{}{}", value, separator, existing)
        }
        _ => value.to_string(),
    }
}

/// Copy/paste-able rendering of a command line.
pub fn format_command_for_logs(program: &str, args: &[String]) -> String {
    let mut rendered = shell_escape(program);
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&shell_escape(arg));
    }
    rendered
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
