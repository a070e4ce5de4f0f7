//! Destination payloads.
//!
//! Discord webhooks take `{username, avatar_url, content, embeds}`; the body
//! is rewritten from source markup to Discord markdown by [`render_text`]
//! before it is split, so chunk limits hold for what is actually sent. Slack
//! webhooks take `{text, blocks}` and understand the source markup as-is. In
//! both cases the attribution line rides on the last chunk only.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use relay_core::{ProfileInfo, RelayTarget};
use serde_json::{json, Value};

/// Discord rejects webhook usernames longer than this.
const DISCORD_USERNAME_MAX: usize = 80;
const DISCORD_EMBED_COLOR: u32 = 0x4a154b;

/// What goes into one chunk's payload.
#[derive(Debug, Clone, Copy)]
pub struct ChunkContext<'a> {
    /// Chunk of the text returned by [`render_text`].
    pub text: &'a str,
    pub profile: &'a ProfileInfo,
    /// Source timestamp of the whole message.
    pub timestamp: f64,
    pub is_last: bool,
}

/// Message text in the destination's markup, ready to be split.
pub fn render_text(target: RelayTarget, text: &str) -> String {
    match target {
        RelayTarget::Discord => sanitize_for_discord(text),
        RelayTarget::None | RelayTarget::Slack => text.to_string(),
    }
}

/// Build the webhook body for `target`, or `None` when relay is disabled.
pub fn build_payload(target: RelayTarget, ctx: &ChunkContext<'_>) -> Option<Value> {
    match target {
        RelayTarget::None => None,
        RelayTarget::Discord => Some(discord_payload(ctx)),
        RelayTarget::Slack => Some(slack_payload(ctx)),
    }
}

pub fn discord_payload(ctx: &ChunkContext<'_>) -> Value {
    let username: String = ctx.profile.name.chars().take(DISCORD_USERNAME_MAX).collect();
    let mut payload = json!({
        "username": username,
        "content": ctx.text,
        // Rewritten @here/@everyone must not ping the destination server.
        "allowed_mentions": { "parse": [] },
    });
    if let Some(ref avatar) = ctx.profile.avatar {
        payload["avatar_url"] = json!(avatar);
    }
    if ctx.is_last {
        payload["embeds"] = json!([{
            "description": attribution(&ctx.profile.handle, ctx.timestamp),
            "color": DISCORD_EMBED_COLOR,
        }]);
    }
    payload
}

pub fn slack_payload(ctx: &ChunkContext<'_>) -> Value {
    let mut blocks = Vec::new();
    // Slack refuses section blocks with empty text.
    if !ctx.text.trim().is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": ctx.text },
        }));
    }
    if ctx.is_last {
        blocks.push(json!({
            "type": "context",
            "elements": [{
                "type": "mrkdwn",
                "text": attribution(&ctx.profile.handle, ctx.timestamp),
            }],
        }));
        blocks.push(json!({ "type": "divider" }));
    }

    let mut payload = json!({
        "text": ctx.text,
        "username": ctx.profile.name,
        "blocks": blocks,
    });
    if let Some(ref avatar) = ctx.profile.avatar {
        payload["icon_url"] = json!(avatar);
    }
    payload
}

pub fn attribution(handle: &str, timestamp: f64) -> String {
    format!(
        "Original message sent by `{}` on `{}`.",
        handle,
        format_timestamp(timestamp)
    )
}

/// `YYYY-MM-DD HH:MM:SS UTC`; out-of-range values fall back to the raw number.
pub fn format_timestamp(timestamp: f64) -> String {
    let secs = timestamp.trunc() as i64;
    let nanos = ((timestamp.fract() * 1e9).round() as u32).min(999_999_999);
    match DateTime::<Utc>::from_timestamp(secs, nanos) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => timestamp.to_string(),
    }
}

static USER_MENTION_LABELLED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"<@[A-Z0-9]+\|([^>]+)>"));
static USER_MENTION: LazyLock<Regex> = LazyLock::new(|| compile(r"<@([A-Z0-9]+)>"));
static SPECIAL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| compile(r"<!(here|channel|everyone)(?:\|[^>]*)?>"));
static GROUP_MENTION: LazyLock<Regex> =
    LazyLock::new(|| compile(r"<!subteam\^[A-Z0-9]+(?:\|([^>]+))?>"));
static CHANNEL_LABELLED: LazyLock<Regex> = LazyLock::new(|| compile(r"<#[A-Z0-9]+\|([^>]+)>"));
static CHANNEL: LazyLock<Regex> = LazyLock::new(|| compile(r"<#([A-Z0-9]+)\|?>"));
static LINK_LABELLED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"<((?:https?|mailto):[^|>]+)\|([^>]+)>"));
static LINK: LazyLock<Regex> = LazyLock::new(|| compile(r"<((?:https?|mailto):[^>]+)>"));
static BOLD: LazyLock<Regex> = LazyLock::new(|| compile(r"(^|[^\w*])\*([^*\n]+?)\*"));
static STRIKE: LazyLock<Regex> = LazyLock::new(|| compile(r"(^|[^\w~])~([^~\n]+?)~"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

/// Rewrite source markup into Discord markdown.
///
/// Mention tokens become plain `@name` / `#channel` text, labelled links
/// become `[label](url)`, `*bold*` becomes `**bold**`, `~strike~` becomes
/// `~~strike~~`, and the three escaped HTML entities are decoded.
pub fn sanitize_for_discord(text: &str) -> String {
    let out = USER_MENTION_LABELLED.replace_all(text, "@$1");
    let out = USER_MENTION.replace_all(&out, "@$1");
    let out = SPECIAL_MENTION.replace_all(&out, "@$1");
    let out = GROUP_MENTION.replace_all(&out, "$1");
    let out = CHANNEL_LABELLED.replace_all(&out, "#$1");
    let out = CHANNEL.replace_all(&out, "#$1");
    let out = LINK_LABELLED.replace_all(&out, "[$2]($1)");
    let out = LINK.replace_all(&out, "$1");
    let out = BOLD.replace_all(&out, "${1}**${2}**");
    let out = STRIKE.replace_all(&out, "${1}~~${2}~~");
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
