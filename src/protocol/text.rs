//! JSON chat components flattened to legacy `§`-formatted text.

use serde_json::Value;

/// Legacy code for a named color.
fn color_code(name: &str) -> Option<char> {
    let code = match name {
        "black" => '0',
        "dark_blue" => '1',
        "dark_green" => '2',
        "dark_aqua" => '3',
        "dark_red" => '4',
        "dark_purple" => '5',
        "gold" => '6',
        "gray" => '7',
        "dark_gray" => '8',
        "blue" => '9',
        "green" => 'a',
        "aqua" => 'b',
        "red" => 'c',
        "light_purple" => 'd',
        "yellow" => 'e',
        "white" => 'f',
        "reset" => 'r',
        _ => return None,
    };
    Some(code)
}

const STYLE_CODES: [(&str, char); 5] = [
    ("obfuscated", 'k'),
    ("bold", 'l'),
    ("strikethrough", 'm'),
    ("underlined", 'n'),
    ("italic", 'o'),
];

/// Flatten a JSON chat component to legacy text.
///
/// Input that is not valid JSON is returned unchanged.
pub fn component_to_legacy(json: &str) -> String {
    match serde_json::from_str::<Value>(json) {
        Ok(value) => {
            let mut out = String::new();
            render(&value, &mut out);
            out
        }
        Err(_) => json.to_string(),
    }
}

fn render(value: &Value, out: &mut String) {
    match value {
        Value::String(text) => out.push_str(text),
        Value::Array(parts) => {
            for part in parts {
                render(part, out);
            }
        }
        Value::Object(map) => {
            if let Some(code) = map.get("color").and_then(Value::as_str).and_then(color_code) {
                out.push('§');
                out.push(code);
            }
            for (key, code) in STYLE_CODES {
                if map.get(key).and_then(Value::as_bool) == Some(true) {
                    out.push('§');
                    out.push(code);
                }
            }

            if let Some(text) = map.get("text").and_then(Value::as_str) {
                out.push_str(text);
            } else if let Some(key) = map.get("translate").and_then(Value::as_str) {
                render_translation(key, map.get("with"), out);
            }

            if let Some(Value::Array(extra)) = map.get("extra") {
                for part in extra {
                    render(part, out);
                }
            }
        }
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(&b.to_string()),
        Value::Null => {}
    }
}

fn render_translation(key: &str, with: Option<&Value>, out: &mut String) {
    let args: Vec<String> = match with {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let mut rendered = String::new();
                render(item, &mut rendered);
                rendered
            })
            .collect(),
        _ => Vec::new(),
    };

    let template = match key {
        "chat.type.text" => "<%s> %s",
        "chat.type.emote" => "* %s %s",
        "chat.type.announcement" => "[%s] %s",
        _ => {
            out.push_str(key);
            for arg in &args {
                out.push(' ');
                out.push_str(arg);
            }
            return;
        }
    };

    let mut args = args.into_iter();
    let mut pieces = template.split("%s").peekable();
    while let Some(piece) = pieces.next() {
        out.push_str(piece);
        if pieces.peek().is_some() {
            out.push_str(&args.next().unwrap_or_default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_string_and_text() {
        assert_eq!(component_to_legacy(r#""hello""#), "hello");
        assert_eq!(component_to_legacy(r#"{"text":"hello"}"#), "hello");
        assert_eq!(component_to_legacy("not json"), "not json");
    }

    #[test]
    fn test_nested_extra_with_colors() {
        let json = r#"{"text":"","extra":[{"text":"Guild > ","color":"dark_green"},{"text":"[MVP+] Steve","color":"aqua","bold":true},{"text":": hi","color":"white"}]}"#;
        assert_eq!(
            component_to_legacy(json),
            "§2Guild > §b§l[MVP+] Steve§f: hi"
        );
    }

    #[test]
    fn test_translate_templates() {
        let json = r#"{"translate":"chat.type.text","with":["Steve",{"text":"hi"}]}"#;
        assert_eq!(component_to_legacy(json), "<Steve> hi");

        let json = r#"{"translate":"multiplayer.disconnect.kicked"}"#;
        assert_eq!(component_to_legacy(json), "multiplayer.disconnect.kicked");
    }
}
