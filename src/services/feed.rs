//! RSS 2.0 feed of the latest published posts

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::SiteConfig;
use crate::models::Post;
use crate::services::post::{PostService, PostServiceError};

pub struct FeedService {
    posts: Arc<PostService>,
    site: SiteConfig,
}

impl FeedService {
    pub fn new(posts: Arc<PostService>, site: SiteConfig) -> Self {
        Self { posts, site }
    }

    pub async fn rss(&self) -> Result<String, PostServiceError> {
        let posts = self.posts.recent_published(self.site.feed_size).await?;
        Ok(render_rss(&self.site, &posts, Utc::now()))
    }
}

/// Render the channel document. `now` is used for `lastBuildDate` when
/// there are no posts.
pub fn render_rss(site: &SiteConfig, posts: &[Post], now: DateTime<Utc>) -> String {
    let base = site.url.trim_end_matches('/');
    let last_build = posts
        .iter()
        .filter_map(|p| p.published_at)
        .max()
        .unwrap_or(now);

    let mut items = String::new();
    for post in posts {
        let link = format!("{}/blog/{}", base, post.slug);
        let published = post.published_at.unwrap_or(post.updated_at);
        items.push_str(&format!(
            "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid isPermaLink=\"true\">{}</guid>\n      <pubDate>{}</pubDate>\n      <description>{}</description>\n    </item>\n",
            xml_escape(&post.title),
            xml_escape(&link),
            xml_escape(&link),
            published.to_rfc2822(),
            xml_escape(&post.excerpt),
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n  <channel>\n    <title>{title}</title>\n    <link>{link}</link>\n    <description>{description}</description>\n    <language>{language}</language>\n    <managingEditor>{author}</managingEditor>\n    <lastBuildDate>{last_build}</lastBuildDate>\n    <atom:link href=\"{link}/rss.xml\" rel=\"self\" type=\"application/rss+xml\"/>\n{items}  </channel>\n</rss>\n",
        title = xml_escape(&site.title),
        link = xml_escape(base),
        description = xml_escape(&site.description),
        language = xml_escape(&site.language),
        author = xml_escape(&site.author),
        last_build = last_build.to_rfc2822(),
        items = items,
    )
}

pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
