//! Company homepage text extraction for description generation.

use std::collections::HashSet;
use std::time::Duration;

use scraper::{Html, Selector};
use tracing::debug;

use crate::error::ContentError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
/// Content blocks taken from a single page.
const MAX_BLOCKS_PER_PAGE: usize = 15;
/// About-style links followed per page.
const MAX_ABOUT_LINKS: usize = 2;
/// Stop following links once this many words are collected.
const FOLLOW_BELOW_WORDS: usize = 200;
const MAX_WORDS: usize = 1000;

const ABOUT_TERMS: &[&str] = &["about", "company", "who we are"];

/// Text pulled from one page.
#[derive(Debug, Default, PartialEq)]
pub struct PageText {
    pub meta_description: Option<String>,
    /// Non-empty h1/h2/h3/p texts, capped per page.
    pub blocks: Vec<String>,
    /// Absolute URLs of links whose text mentions the company.
    pub about_links: Vec<String>,
}

/// Parse one HTML page. `base` is the site root used for relative links.
pub fn extract_page(html: &str, base: &str) -> PageText {
    let document = Html::parse_document(html);
    let (Ok(meta), Ok(links), Ok(blocks)) = (
        Selector::parse(r#"meta[name="description"]"#),
        Selector::parse("a[href]"),
        Selector::parse("h1, h2, h3, p"),
    ) else {
        return PageText::default();
    };

    let meta_description = document
        .select(&meta)
        .find_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let base = base.trim_end_matches('/');
    let about_links = document
        .select(&links)
        .filter_map(|el| {
            let text = el.text().collect::<String>().to_lowercase();
            if !ABOUT_TERMS.iter().any(|term| text.contains(term)) {
                return None;
            }
            let href = el.value().attr("href")?.trim();
            if href.starts_with('/') {
                Some(format!("{base}{href}"))
            } else if href.starts_with("http") {
                Some(href.to_string())
            } else {
                None
            }
        })
        .collect();

    let blocks = document
        .select(&blocks)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .take(MAX_BLOCKS_PER_PAGE)
        .collect();

    PageText {
        meta_description,
        blocks,
        about_links,
    }
}

/// `https://` prefixed unless the domain already carries a scheme.
pub fn site_url(domain: &str) -> String {
    let domain = domain.trim();
    if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    }
}

/// Join text pieces and cap the result at `MAX_WORDS` words.
pub fn cap_words(pieces: &[String]) -> String {
    let joined = pieces.join(" ");
    let words: Vec<&str> = joined.split_whitespace().collect();
    if words.len() > MAX_WORDS {
        format!("{}...", words[..MAX_WORDS].join(" "))
    } else {
        joined
    }
}

fn word_count(pieces: &[String]) -> usize {
    pieces.iter().map(|p| p.split_whitespace().count()).sum()
}

/// Fetches a company's homepage plus a couple of about pages.
#[derive(Debug, Clone, Default)]
pub struct HomepageScraper {
    client: reqwest::Client,
}

impl HomepageScraper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readable text describing the company behind `domain`.
    pub async fn company_text(&self, domain: &str) -> Result<String, ContentError> {
        let root = site_url(domain);
        let mut visited: HashSet<String> = HashSet::new();
        let mut content: Vec<String> = Vec::new();
        let mut queue = vec![root.clone()];

        while let Some(url) = queue.pop() {
            if !visited.insert(url.clone()) {
                continue;
            }
            let html = match self.fetch(&url).await {
                Ok(html) => html,
                Err(e) if url == root => return Err(e),
                Err(e) => {
                    debug!(url = %url, error = %e, "Skipping about page");
                    continue;
                }
            };

            let page = extract_page(&html, &root);
            content.extend(page.meta_description);
            content.extend(page.blocks);

            if word_count(&content) < FOLLOW_BELOW_WORDS {
                for link in page.about_links.into_iter().take(MAX_ABOUT_LINKS).rev() {
                    if !visited.contains(&link) {
                        queue.push(link);
                    }
                }
            }
        }

        debug!(domain, pages = visited.len(), words = word_count(&content), "Homepage scraped");
        Ok(cap_words(&content))
    }

    async fn fetch(&self, url: &str) -> Result<String, ContentError> {
        let fetch_err = |reason: String| ContentError::Fetch {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("status {}", response.status())));
        }
        response.text().await.map_err(|e| fetch_err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HOME: &str = r#"<html><head><meta name="description" content=" Engines for everyone "></head>
        <body><h1>X Corp</h1><p>We build engines.</p><p>   </p>
        <a href="/about">About us</a><a href="/pricing">Pricing</a>
        <a href="mailto:hi@x.com">Company mail</a></body></html>"#;

    #[test]
    fn page_extraction() {
        let page = extract_page(HOME, "https://x.com/");
        assert_eq!(page.meta_description.as_deref(), Some("Engines for everyone"));
        assert_eq!(page.blocks, vec!["X Corp", "We build engines."]);
        assert_eq!(page.about_links, vec!["https://x.com/about"]);
    }

    #[test]
    fn blocks_are_capped_per_page() {
        let html: String = (0..20).map(|i| format!("<p>para {i}</p>")).collect();
        assert_eq!(extract_page(&html, "https://x.com").blocks.len(), MAX_BLOCKS_PER_PAGE);
    }

    #[test]
    fn urls_and_word_cap() {
        assert_eq!(site_url("x.com"), "https://x.com");
        assert_eq!(site_url("http://x.com"), "http://x.com");

        let long = vec!["word ".repeat(1200)];
        let capped = cap_words(&long);
        assert!(capped.ends_with("..."));
        assert_eq!(capped.trim_end_matches("...").split_whitespace().count(), MAX_WORDS);
    }

    #[tokio::test]
    async fn follows_about_links_while_text_is_short() {
        let server = MockServer::start().await;
        let home = HOME.replace("/about", &format!("{}/about", server.uri()));
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(home))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/about"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Founded in 1843.</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let text = HomepageScraper::new().company_text(&server.uri()).await.unwrap();
        assert_eq!(text, "Engines for everyone X Corp We build engines. Founded in 1843.");
    }

    #[tokio::test]
    async fn homepage_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = HomepageScraper::new().company_text(&server.uri()).await.unwrap_err();
        assert!(matches!(err, ContentError::Fetch { .. }));
    }
}
