//! Notification -> display text.
//!
//! The output is the user-visible contract of every backend, so glyphs, their
//! order and the quoting rules are fixed.

use std::collections::HashMap;

use crate::{domain::Action, notification::Notification};

/// Avatar table indexed by the CRC-32 (IEEE) of the raw author identity.
const AVATARS: &str = concat!(
    "🐀🐁🐂🐃🐄🐅🐆🐇🐈🐉🐊🐋🐌🐍🐎🐏🐐🐑🐒🐓🐕🐖🐗🐘🐙🐛🐜🐝🐞🐟🐠🐡🐢🐥🐨🐩🐪🐫🐬🐭🐮🐯🐰🐱🐲🐳🐴🐵🐶🐷🐸🐹🐺🐻🐼",
    "🐿🦀🦁🦂🦃🦄🦅🦆🦇🦈🦉🦊🦋🦌🦍🦎🦏🦐🦑🦒🦓🦔🦕🦖🦗🦘🦙🦚🦛🦜🦝🦞🦟🦠🦡🦢🦥🦦🦧🦨🦩",
);

const GLYPH_DELETE: &str = "\u{274c}\u{fe0f}";
const GLYPH_CREATE: &str = "\u{1f195}\u{fe0f}";
const GLYPH_MODIFY: &str = "\u{270f}\u{fe0f}";
const GLYPH_ANY_SCOPE: &str = "\u{2606}\u{fe0f}";
const GLYPH_COMMENT: &str = "\u{1f5d2}";

const CASE_TYPE: &str = "application/x-case";
const SYMLINK_TYPE: &str = "application/x-symlink";

/// Case scopes in the order they are checked.
const CASE_SCOPES: [(&str, &str); 4] = [
    ("server", "ⓗ"),
    ("group", "ⓖ"),
    ("datacenter", "ⓓ"),
    ("service", "ⓢ"),
];

/// Render a notification.
///
/// `author_mention` and `path_label` are already formatted by the backend.
pub fn render(notification: &Notification, author_mention: &str, path_label: &str) -> String {
    let mut text = String::new();
    text.push_str(&notification.mtime);
    text.push('\n');
    text.push(avatar(&notification.author));
    text.push(' ');
    text.push_str(author_mention);
    text.push('\n');

    let action = notification.action();
    text.push_str(action_symbol(action));
    text.push(' ');
    text.push_str(path_label);

    if action != Action::Delete && notification.with_value() {
        let ct = content_type_symbol(&notification.content_type);
        if !ct.is_empty() {
            text.push(' ');
            text.push_str(ct);
        }
        if let Some(value) = &notification.value {
            match notification.content_type.as_str() {
                CASE_TYPE => match parse_cases(value) {
                    Some(cases) => {
                        for case in &cases {
                            push_case(&mut text, case);
                        }
                    }
                    None => block_quote(&mut text, value, ""),
                },
                SYMLINK_TYPE => {
                    text.push('\n');
                    text.push_str(value);
                }
                other => block_quote(&mut text, value, other),
            }
        }
    }

    if !notification.comment.is_empty() {
        text.push('\n');
        text.push_str(GLYPH_COMMENT);
        text.push(' ');
        text.push_str(&notification.comment);
    }
    text
}

/// Stable avatar for an author identity.
pub fn avatar(author: &str) -> char {
    let mut crc = flate2::Crc::new();
    crc.update(author.as_bytes());
    let count = AVATARS.chars().count();
    let idx = crc.sum() as usize % count;
    AVATARS.chars().nth(idx).unwrap_or('?')
}

/// Short glyph for a content type, empty for unknown types.
pub fn content_type_symbol(content_type: &str) -> &'static str {
    match content_type {
        "application/x-null" => "∅",
        "application/x-symlink" => "➦",
        "application/x-case" => "⌥",
        "application/x-template" => "✄",
        "application/json" => "🄹",
        "application/x-yaml" => "🅈",
        _ => "",
    }
}

fn action_symbol(action: Action) -> &'static str {
    match action {
        Action::Delete => GLYPH_DELETE,
        Action::Create => GLYPH_CREATE,
        Action::Modify => GLYPH_MODIFY,
        Action::Other => "",
    }
}

type Case = HashMap<String, Option<String>>;

/// A JSON `null` document is a valid, empty case list.
fn parse_cases(value: &str) -> Option<Vec<Case>> {
    serde_json::from_str::<Option<Vec<Case>>>(value)
        .ok()
        .map(Option::unwrap_or_default)
}

fn case_field<'a>(case: &'a Case, key: &str) -> Option<&'a str> {
    case.get(key).map(|v| v.as_deref().unwrap_or(""))
}

fn push_case(text: &mut String, case: &Case) {
    text.push('\n');
    let scope = CASE_SCOPES
        .iter()
        .find_map(|(key, glyph)| case_field(case, key).map(|v| (*glyph, v)));
    match scope {
        Some((glyph, value)) => {
            text.push_str(glyph);
            text.push(' ');
            text.push_str(value);
        }
        None => text.push_str(GLYPH_ANY_SCOPE),
    }
    text.push_str(": ");

    let ct = content_type_symbol(case_field(case, "mime").unwrap_or(""));
    text.push_str(ct);
    if let Some(value) = case_field(case, "value") {
        if !ct.is_empty() {
            text.push(' ');
        }
        if value.contains('"') {
            text.push('«');
            text.push_str(value);
            text.push('»');
        } else {
            text.push('"');
            text.push_str(value);
            text.push('"');
        }
    }
}

fn block_quote(text: &mut String, value: &str, content_type: &str) {
    text.push('\n');
    if value.is_empty() {
        return;
    }

    let lang = match content_type {
        "application/json" => "json",
        "application/x-yaml" => "yaml",
        _ => "",
    };
    text.push_str("```");
    text.push_str(lang);
    text.push('\n');
    text.push_str(value);
    if !value.ends_with('\n') {
        text.push('\n');
    }
    text.push_str("```");
}
