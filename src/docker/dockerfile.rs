//! Dockerfile text: reconstructed from image history and generated for the slim build

use crate::toolkit::BuilderSpec;
use std::fmt::Write;

const SHELL_PREFIX: &str = "/bin/sh -c ";
const NOP_MARKER: &str = "#(nop) ";
const BUILDKIT_SUFFIX: &str = " # buildkit";

/// Rebuilds Dockerfile instructions from `created_by` history entries.
///
/// The daemon lists history newest first; the result is in build order.
pub fn reverse_history(created_by: &[String]) -> Vec<String> {
    created_by
        .iter()
        .rev()
        .filter_map(|entry| history_instruction(entry))
        .collect()
}

fn history_instruction(created_by: &str) -> Option<String> {
    let entry = created_by.trim();
    let entry = entry.strip_suffix(BUILDKIT_SUFFIX).unwrap_or(entry).trim();
    if entry.is_empty() {
        return None;
    }

    // legacy builder: `/bin/sh -c #(nop)  CMD ["nginx"]` or `/bin/sh -c apt-get ...`
    if let Some(rest) = entry.strip_prefix(SHELL_PREFIX) {
        let rest = rest.trim_start();
        return Some(match rest.strip_prefix(NOP_MARKER) {
            Some(nop) => nop.trim().to_string(),
            None => format!("RUN {}", rest),
        });
    }

    // build args prefix: `|2 A=1 B=2 /bin/sh -c make`
    if entry.starts_with('|') {
        if let Some(idx) = entry.find(SHELL_PREFIX) {
            return Some(format!("RUN {}", entry[idx + SHELL_PREFIX.len()..].trim()));
        }
    }

    Some(entry.to_string())
}

/// Dockerfile for the minimized image.
///
/// Container overrides are only applied for the instructions selected in
/// `spec.image_overrides`; everything else comes from the fat image config.
pub fn render_slim_dockerfile(spec: &BuilderSpec, has_data: bool) -> String {
    let config = &spec.image.config;
    let selected = spec.image_overrides;
    let overrides = &spec.overrides;

    let workdir = if selected.workdir {
        overrides.resolve_workdir(config.workdir.as_deref())
    } else {
        config.workdir.clone().filter(|w| !w.is_empty())
    };
    let env = if selected.env {
        overrides.merge_env(&config.env)
    } else {
        config.env.clone()
    };
    let ports = if selected.expose {
        overrides.merge_ports(&config.exposed_ports)
    } else {
        config.exposed_ports.clone()
    };
    let entrypoint = if selected.entrypoint {
        overrides.resolve_entrypoint(config.entrypoint.as_deref())
    } else {
        config.entrypoint.clone()
    };
    let cmd = if selected.cmd {
        overrides.resolve_cmd(config.cmd.as_deref())
    } else {
        config.cmd.clone()
    };

    let mut out = String::from("FROM scratch\n");
    if has_data {
        out.push_str("COPY files /\n");
    }
    if let Some(workdir) = workdir {
        let _ = writeln!(out, "WORKDIR {}", workdir);
    }
    for entry in &env {
        let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
        let _ = writeln!(out, "ENV {}={}", key, json_string(value));
    }
    if let Some(user) = config.user.as_deref().filter(|u| !u.is_empty()) {
        let _ = writeln!(out, "USER {}", user);
    }
    for port in &ports {
        let _ = writeln!(out, "EXPOSE {}", port);
    }
    if let Some(entrypoint) = entrypoint {
        let _ = writeln!(out, "ENTRYPOINT {}", json_array(&entrypoint));
    }
    if let Some(cmd) = cmd {
        let _ = writeln!(out, "CMD {}", json_array(&cmd));
    }
    out
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn json_array(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}
