//! Connectivity probe: loads the first feed page and prints a summary
//!
//! Reads the client configuration from the environment. With
//! `SOCIAL_PROBE_EMAIL` and `SOCIAL_PROBE_PASSWORD` set it signs in first,
//! so viewer likes are included.

use anyhow::Context;
use social_client::{logging, Config, FeedSource, SocialClient};
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    logging::init_tracing(&config.logging);

    let client = SocialClient::connect(config).context("building platform client")?;

    if let (Ok(email), Ok(password)) = (
        env::var("SOCIAL_PROBE_EMAIL"),
        env::var("SOCIAL_PROBE_PASSWORD"),
    ) {
        let session = client
            .platform()
            .auth
            .sign_in_with_password(&email, &password)
            .await
            .context("signing in")?;
        info!(user_id = %session.user.id, "Signed in");
    }

    let feed = client
        .load_first(&FeedSource)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()).context("loading feed"))?;

    println!(
        "feed: {} posts, more pages: {}",
        feed.len(),
        feed.has_next_page()
    );
    for post in feed.iter() {
        let author = post
            .author
            .as_ref()
            .map(|a| a.label().to_string())
            .unwrap_or_else(|| post.user_id.to_string());
        println!(
            "{}  {:<20} likes={:<4} comments={:<4} {}",
            post.created_at.format("%Y-%m-%d %H:%M"),
            author,
            post.like_count,
            post.comment_count,
            post.content.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
