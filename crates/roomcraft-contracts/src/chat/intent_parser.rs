use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub message: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            message: None,
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg(&self, key: &str) -> &str {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

fn find_spec(command: &str, specs: &[CommandSpec]) -> Option<CommandSpec> {
    specs.iter().find(|spec| spec.command == command).copied()
}

fn parse_single_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Err(_) => arg.trim().to_string(),
    }
}

/// Turns one line of REPL input into an intent.
///
/// Lines starting with `/` followed by a known command name map to that
/// command; everything else (including `/` alone) is a chat message.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(spec) = find_spec(&command, RAW_ARG_COMMANDS) {
                let mut intent = Intent::new(spec.action, text);
                intent
                    .command_args
                    .insert(spec.arg_key.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(spec) = find_spec(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(spec.action, text);
                intent.command_args.insert(
                    spec.arg_key.to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(spec) = find_spec(&command, NO_ARG_COMMANDS) {
                return Intent::new(spec.action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("chat", text);
    intent.message = Some(raw_trimmed.to_string());
    intent
}
