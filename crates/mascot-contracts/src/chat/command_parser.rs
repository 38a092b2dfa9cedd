use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, NO_ARG_COMMANDS, SINGLE_PATH_COMMANDS, TEXT_FIELD_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub args: BTreeMap<String, Value>,
}

impl Command {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.args.insert(key.to_string(), value);
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn arg_u64(&self, key: &str) -> Option<u64> {
        self.args.get(key).and_then(Value::as_u64)
    }

    pub fn arg_f64(&self, key: &str) -> Option<f64> {
        self.args.get(key).and_then(Value::as_f64)
    }

    pub fn arg_list(&self, key: &str) -> Vec<String> {
        self.args
            .get(key)
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn join_args(arg: &str) -> String {
    split_args(arg).join(" ")
}

/// Splits `"<head> <rest>"`, unquoting the rest.
fn head_and_text(arg: &str) -> (String, String) {
    let trimmed = arg.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head.to_string(), join_args(rest)),
        None => (trimmed.to_string(), String::new()),
    }
}

fn number_value(raw: &str) -> Value {
    raw.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn index_value(raw: &str) -> Value {
    raw.trim()
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or(Value::Null)
}

fn string_list(values: impl IntoIterator<Item = String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}

pub fn parse_command(text: &str) -> Command {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Command::new("noop", text);
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        let mut command = Command::new("generate", text);
        command.prompt = Some(raw_trimmed.to_string());
        return command;
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        let mut command = Command::new("generate", text);
        command.prompt = Some(raw_trimmed.to_string());
        return command;
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return Command::new(action, text);
    }

    if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
        return Command::new(action, text).with_arg("path", Value::String(join_args(arg)));
    }

    if let Some((spec, field)) = TEXT_FIELD_COMMANDS
        .iter()
        .find(|(spec, _)| spec.command == command)
    {
        let (section, value) = head_and_text(arg);
        return Command::new(spec.action, text)
            .with_arg("section", Value::String(section))
            .with_arg("field", Value::String((*field).to_string()))
            .with_arg("value", Value::String(value));
    }

    match command.as_str() {
        "select" => Command::new("select_image", text).with_arg("index", index_value(arg)),
        "items" => {
            let mut parts = split_args(arg).into_iter();
            let section = parts.next().unwrap_or_default();
            Command::new("set_items", text)
                .with_arg("section", Value::String(section))
                .with_arg("items", string_list(parts))
        }
        "social" => {
            let (platform, url) = head_and_text(arg);
            Command::new("set_social", text)
                .with_arg("platform", Value::String(platform))
                .with_arg("url", Value::String(url))
        }
        "font_size" => {
            let parts = split_args(arg);
            let part = |idx: usize| Value::String(parts.get(idx).cloned().unwrap_or_default());
            Command::new("set_font_size", text)
                .with_arg("section", part(0))
                .with_arg("field", part(1))
                .with_arg("size", part(2))
        }
        "move" => {
            let parts = split_args(arg);
            let part = |idx: usize| Value::String(parts.get(idx).cloned().unwrap_or_default());
            Command::new("move_section", text)
                .with_arg("section", part(0))
                .with_arg("direction", part(1))
        }
        "edit" => {
            let (slot, prompt) = head_and_text(arg);
            let mut edit = Command::new("edit_image", text).with_arg("slot", index_value(&slot));
            edit.prompt = Some(prompt).filter(|value| !value.is_empty());
            edit
        }
        "adjust" => {
            let parts = split_args(arg);
            let part = |idx: usize| parts.get(idx).map(String::as_str).unwrap_or("100");
            Command::new("adjust_image", text)
                .with_arg("slot", index_value(parts.first().map(String::as_str).unwrap_or("")))
                .with_arg("brightness", number_value(part(1)))
                .with_arg("contrast", number_value(part(2)))
                .with_arg("saturation", number_value(part(3)))
        }
        _ => Command::new("unknown", text)
            .with_arg("command", Value::String(command))
            .with_arg("arg", Value::String(arg.to_string())),
    }
}
