//! Built-in `api:<site>` handlers for widely-used JSON APIs (§4.8 item 2).

use crate::content_intelligence::{ContentResult, ContentResultMeta};

pub trait SiteApiHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn matches(&self, url: &str) -> bool;
    fn build_api_url(&self, url: &str) -> String;
    fn extract(&self, json: &serde_json::Value) -> ContentResult;
}

fn result(text: String, title: Option<String>, json: serde_json::Value, name: &str) -> ContentResult {
    ContentResult {
        text,
        markdown: String::new(),
        title,
        structured_data: Some(json),
        meta: ContentResultMeta {
            strategy: format!("api:{name}"),
            strategies_attempted: vec![],
        },
    }
}

pub struct RedditHandler;

impl SiteApiHandler for RedditHandler {
    fn name(&self) -> &'static str {
        "reddit"
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("reddit.com/r/")
    }

    fn build_api_url(&self, url: &str) -> String {
        let trimmed = url.trim_end_matches('/');
        format!("{trimmed}.json")
    }

    fn extract(&self, json: &serde_json::Value) -> ContentResult {
        let title = json
            .pointer("/0/data/children/0/data/title")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        result(json.to_string(), title, json.clone(), self.name())
    }
}

pub struct HackerNewsHandler;

impl SiteApiHandler for HackerNewsHandler {
    fn name(&self) -> &'static str {
        "hackernews"
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("news.ycombinator.com/item")
    }

    fn build_api_url(&self, url: &str) -> String {
        let id = url.split("id=").nth(1).unwrap_or_default();
        format!("https://hacker-news.firebaseio.com/v0/item/{id}.json")
    }

    fn extract(&self, json: &serde_json::Value) -> ContentResult {
        let title = json.get("title").and_then(|v| v.as_str()).map(str::to_string);
        result(json.to_string(), title, json.clone(), self.name())
    }
}

pub struct GitHubHandler;

impl SiteApiHandler for GitHubHandler {
    fn name(&self) -> &'static str {
        "github"
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("github.com/")
    }

    fn build_api_url(&self, url: &str) -> String {
        let path = url.split("github.com/").nth(1).unwrap_or_default();
        format!("https://api.github.com/repos/{path}")
    }

    fn extract(&self, json: &serde_json::Value) -> ContentResult {
        let title = json.get("full_name").and_then(|v| v.as_str()).map(str::to_string);
        result(json.to_string(), title, json.clone(), self.name())
    }
}

pub struct WikipediaHandler;

impl SiteApiHandler for WikipediaHandler {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("wikipedia.org/wiki/")
    }

    fn build_api_url(&self, url: &str) -> String {
        let (host, title) = url
            .split_once("wikipedia.org/wiki/")
            .map(|(h, t)| (h, t))
            .unwrap_or((url, ""));
        format!("{host}wikipedia.org/api/rest_v1/page/summary/{title}")
    }

    fn extract(&self, json: &serde_json::Value) -> ContentResult {
        let title = json.get("title").and_then(|v| v.as_str()).map(str::to_string);
        let text = json.get("extract").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        result(text, title, json.clone(), self.name())
    }
}

pub struct StackExchangeHandler;

impl SiteApiHandler for StackExchangeHandler {
    fn name(&self) -> &'static str {
        "stackexchange"
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("stackoverflow.com/questions/") || url.contains("stackexchange.com/questions/")
    }

    fn build_api_url(&self, url: &str) -> String {
        let id = url
            .split("/questions/")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .unwrap_or_default();
        format!("https://api.stackexchange.com/2.3/questions/{id}?site=stackoverflow&filter=withbody")
    }

    fn extract(&self, json: &serde_json::Value) -> ContentResult {
        let item = json.pointer("/items/0");
        let title = item.and_then(|v| v.get("title")).and_then(|v| v.as_str()).map(str::to_string);
        let body = item.and_then(|v| v.get("body")).and_then(|v| v.as_str()).unwrap_or_default();
        result(body.to_string(), title, json.clone(), self.name())
    }
}

pub struct NpmHandler;

impl SiteApiHandler for NpmHandler {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn matches(&self, url: &str) -> bool {
        url.contains("npmjs.com/package/")
    }

    fn build_api_url(&self, url: &str) -> String {
        let name = url.split("npmjs.com/package/").nth(1).unwrap_or_default();
        format!("https://registry.npmjs.org/{name}")
    }

    fn extract(&self, json: &serde_json::Value) -> ContentResult {
        let title = json.get("name").and_then(|v| v.as_str()).map(str::to_string);
        let text = json.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        result(text, title, json.clone(), self.name())
    }
}

pub fn all() -> Vec<Box<dyn SiteApiHandler>> {
    vec![
        Box::new(RedditHandler),
        Box::new(HackerNewsHandler),
        Box::new(GitHubHandler),
        Box::new(WikipediaHandler),
        Box::new(StackExchangeHandler),
        Box::new(NpmHandler),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reddit_handler_matches_and_builds_json_url() {
        let handler = RedditHandler;
        let url = "https://www.reddit.com/r/rust/comments/abc123/title/";
        assert!(handler.matches(url));
        assert_eq!(handler.build_api_url(url), "https://www.reddit.com/r/rust/comments/abc123/title.json");
    }

    #[test]
    fn hackernews_handler_extracts_item_id() {
        let handler = HackerNewsHandler;
        let url = "https://news.ycombinator.com/item?id=123456";
        assert!(handler.matches(url));
        assert_eq!(handler.build_api_url(url), "https://hacker-news.firebaseio.com/v0/item/123456.json");
    }

    #[test]
    fn npm_handler_builds_registry_url() {
        let handler = NpmHandler;
        let url = "https://www.npmjs.com/package/lodash";
        assert_eq!(handler.build_api_url(url), "https://registry.npmjs.org/lodash");
    }

    #[test]
    fn no_handler_matches_unrelated_url() {
        let url = "https://example.com/blog/post";
        assert!(all().iter().all(|h| !h.matches(url)));
    }
}
