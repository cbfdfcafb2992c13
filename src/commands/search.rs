//! Search commands: YouTube video search through the Data API.

use super::{Category, Command, CommandContext, CommandSpec, Outcome};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};
use whiz_core::error::WhizError;

pub(super) fn commands() -> Vec<Arc<dyn Command>> {
    vec![Arc::new(YouTubeSearch)]
}

const YOUTUBE_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const MAX_RESULTS: u8 = 5;

#[derive(Debug, Deserialize)]
pub(super) struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SearchItem {
    pub id: VideoId,
    pub snippet: Snippet,
}

#[derive(Debug, Deserialize)]
pub(super) struct VideoId {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Snippet {
    pub title: String,
    #[serde(rename = "channelTitle", default)]
    pub channel_title: String,
}

/// Numbered result list; items without a video id are skipped.
pub(super) fn format_results(query: &str, resp: &SearchResponse) -> String {
    let mut out = format!("🔎 *YouTube results for:* {query}\n");
    let mut n = 0;
    for item in &resp.items {
        let Some(id) = &item.id.video_id else { continue };
        n += 1;
        out.push_str(&format!(
            "\n*{n}. {}*\n📺 {}\n🔗 https://youtu.be/{id}\n",
            item.snippet.title, item.snippet.channel_title
        ));
    }
    if n == 0 {
        return format!("No YouTube results found for \"{query}\".");
    }
    out
}

async fn search(
    http: &reqwest::Client,
    api_key: &str,
    query: &str,
) -> Result<SearchResponse, WhizError> {
    let max = MAX_RESULTS.to_string();
    http.get(YOUTUBE_SEARCH_URL)
        .query(&[
            ("part", "snippet"),
            ("type", "video"),
            ("maxResults", max.as_str()),
            ("q", query),
            ("key", api_key),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| WhizError::Http(format!("youtube search failed: {e}")))?
        .json::<SearchResponse>()
        .await
        .map_err(|e| WhizError::Http(format!("youtube response unreadable: {e}")))
}

struct YouTubeSearch;

static YTSEARCH: CommandSpec = CommandSpec {
    name: "ytsearch",
    aliases: &["yts", "youtube"],
    category: Category::Search,
    description: "Search YouTube for videos.",
    usage: "<query>",
    owner_only: false,
    group_only: false,
    admin_only: false,
};

#[async_trait]
impl Command for YouTubeSearch {
    fn spec(&self) -> &CommandSpec {
        &YTSEARCH
    }

    async fn execute(&self, ctx: &CommandContext<'_>) -> Result<Outcome, WhizError> {
        let Some(api_key) = ctx.config.youtube_api_key.as_deref().filter(|k| !k.is_empty())
        else {
            ctx.reply_text("YouTube search is not configured. Set YOUTUBE_API_KEY to enable it.")
                .await;
            return Ok(Outcome::Done);
        };
        if ctx.args.is_empty() {
            ctx.reply_text(&format!(
                "⚠️ Usage: {}ytsearch <query>",
                ctx.config.primary_prefix()
            ))
            .await;
            return Ok(Outcome::Done);
        }

        match search(ctx.http, api_key, ctx.args).await {
            Ok(resp) => {
                info!("ytsearch '{}': {} results", ctx.args, resp.items.len());
                ctx.reply_text(&format_results(ctx.args, &resp)).await;
            }
            Err(e) => {
                error!("{e}");
                ctx.reply_text("Sorry, YouTube search failed. Please try again later.")
                    .await;
            }
        }
        Ok(Outcome::Done)
    }
}
