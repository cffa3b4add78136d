//! Minimal INI editing for cluster configuration files
//!
//! Ceph treats spaces and underscores in option names as equivalent, so
//! `osd pool default size` and `osd_pool_default_size` address the same option.
//! Edits keep every other line as written.

/// Normalized option key used for comparisons
fn normalize(option: &str) -> String {
    option
        .trim()
        .split(|c: char| c == ' ' || c == '_' || c == '\t')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn section_name(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
}

fn option_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

/// Current value of `option` in `section`
pub fn get_option(content: &str, section: &str, option: &str) -> Option<String> {
    let wanted = normalize(option);
    let mut in_section = false;

    for line in content.lines() {
        if let Some(name) = section_name(line) {
            in_section = name == section;
            continue;
        }
        if in_section
            && let Some((key, value)) = option_line(line)
            && normalize(key) == wanted
        {
            return Some(value.to_string());
        }
    }
    None
}

/// Content with `option = value` set in `section`.
///
/// Existing options are rewritten in place, new options go after the last
/// setting of their section, and a missing section is appended.
pub fn set_option(content: &str, section: &str, option: &str, value: &str) -> String {
    let wanted = normalize(option);
    let setting = format!("{option} = {value}");
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let mut in_section = false;
    let mut section_found = false;
    let mut insert_at = None;
    let mut existing = None;

    for (idx, line) in lines.iter().enumerate() {
        if let Some(name) = section_name(line) {
            in_section = name == section;
            if in_section {
                section_found = true;
                insert_at = Some(idx + 1);
            }
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, _)) = option_line(line) {
            if normalize(key) == wanted {
                existing = Some(idx);
                break;
            }
            insert_at = Some(idx + 1);
        }
    }

    if let Some(idx) = existing {
        let indent: String = lines[idx].chars().take_while(|c| c.is_whitespace()).collect();
        lines[idx] = format!("{indent}{setting}");
        return join(&lines);
    }

    match (section_found, insert_at) {
        (true, Some(idx)) => lines.insert(idx, setting),
        _ => {
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(format!("[{section}]"));
            lines.push(setting);
        }
    }
    join(&lines)
}

fn join(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
