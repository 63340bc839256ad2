//! Card normalization
//!
//! Turns a `GuruCard` into the canonical `Document`. Pure: no I/O and no
//! shared state, so every rule here is covered by plain unit tests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::schemas::{Document, DocumentSource, GuruCard, Section};
use crate::time_window::parse_guru_time;

/// Base URL a card slug is appended to
pub const GURU_CARDS_URL: &str = "https://app.getguru.com/card/";

/// Extracts readable text from a card's HTML body
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, html: &str) -> String;
}

/// Tag-stripping extractor good enough for Guru card bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicHtmlExtractor;

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "tr", "table", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "pre", "section", "article", "header", "footer", "hr",
];

impl TextExtractor for BasicHtmlExtractor {
    fn extract_text(&self, html: &str) -> String {
        let mut out = String::with_capacity(html.len());
        let mut rest = html;
        let mut skip_until: Option<&'static str> = None;

        while let Some(lt) = rest.find('<') {
            if skip_until.is_none() {
                out.push_str(&decode_entities(&rest[..lt]));
            }
            let after = &rest[lt + 1..];
            if !after.starts_with(|c: char| c.is_ascii_alphabetic() || c == '/' || c == '!') {
                // Bare `<` in text, not a tag
                if skip_until.is_none() {
                    out.push('<');
                }
                rest = after;
                continue;
            }
            let Some(gt) = after.find('>') else {
                // Unterminated tag: keep the remainder as text
                if skip_until.is_none() {
                    out.push_str(&decode_entities(&rest[lt..]));
                }
                rest = "";
                break;
            };

            let tag = &after[..gt];
            let name = tag_name(tag);

            match skip_until {
                Some(closing) => {
                    if tag.starts_with('/') && name == closing {
                        skip_until = None;
                    }
                }
                None => {
                    if !tag.starts_with('/') && (name == "script" || name == "style") {
                        skip_until = if name == "script" { Some("script") } else { Some("style") };
                    } else if BLOCK_TAGS.contains(&name.as_str()) {
                        out.push('\n');
                    }
                }
            }

            rest = &after[gt + 1..];
        }

        if skip_until.is_none() {
            out.push_str(&decode_entities(rest));
        }

        tidy_lines(&out)
    }
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        match candidate.find(';').filter(|&semi| semi <= 10) {
            Some(semi) => {
                let entity = &candidate[1..semi];
                match decode_entity(entity) {
                    Some(c) => out.push(c),
                    None => out.push_str(&candidate[..=semi]),
                }
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn tidy_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Picks the recency timestamp: the later of verified and modified when
/// the card has been verified, otherwise the modification time.
pub fn recency(last_modified: DateTime<Utc>, last_verified: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match last_verified {
        Some(verified) => verified.max(last_modified),
        None => last_modified,
    }
}

/// Maps one card to exactly one single-section document
pub fn normalize_card(card: &GuruCard, extractor: &dyn TextExtractor) -> Result<Document> {
    let title = card.preferred_phrase.clone();
    let link = format!("{}{}", GURU_CARDS_URL, card.slug);
    let text = format!("{}\n{}", title, extractor.extract_text(&card.content));

    let last_modified = parse_guru_time(&card.last_modified)?;
    let last_verified = card
        .last_verified
        .as_deref()
        .map(parse_guru_time)
        .transpose()?;

    Ok(Document {
        id: card.id.clone(),
        sections: vec![Section { link, text }],
        source: DocumentSource::Guru,
        semantic_identifier: title,
        doc_updated_at: recency(last_modified, last_verified),
        metadata: HashMap::new(),
    })
}
