//! Feed health listing for `wls feeds`.

use anyhow::Result;

use crate::config::Config;
use crate::feed::FeedReader;

pub async fn list_feeds(config: &Config) -> Result<()> {
    if config.feeds.is_empty() {
        println!("No feeds configured.");
        return Ok(());
    }

    let reader = FeedReader::new(config.library.timeout_secs)?;

    println!("{:<24} {:>6}  {:<8} URL", "FEED", "ITEMS", "STATUS");
    for feed in &config.feeds {
        let (count, status) = match reader.try_fetch(feed).await {
            Ok(items) => (items.len().to_string(), "OK".to_string()),
            Err(e) => ("-".to_string(), format!("ERROR ({:#})", e)),
        };
        println!(
            "{:<24} {:>6}  {:<8} {}",
            feed.name.as_deref().unwrap_or("-"),
            count,
            status,
            feed.url
        );
    }

    Ok(())
}
