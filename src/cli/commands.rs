use std::time::Duration;

use crate::app::{AppContext, FeedcastError, Result};
use crate::config::{format_interval, PublishTarget};
use crate::daemon::{daemon_status, stop_daemon, Daemon, DaemonConfig, PidGuard};
use crate::publisher::{OAuthClient, TokenCache};

pub async fn run(ctx: &AppContext, once: bool, no_initial_cycle: bool) -> Result<()> {
    if once {
        let _guard = PidGuard::acquire()?;
        let mut pipeline = ctx.build_pipeline()?;
        let report = pipeline.run_cycle().await;
        println!(
            "{} fetched, {} new, {} published, {} failed, {} skipped",
            report.fetched, report.new, report.published, report.failed, report.skipped
        );
        return Ok(());
    }

    let pipeline = ctx.build_pipeline()?;
    let mut config = DaemonConfig::from_feed(&ctx.config.feed)?;
    if no_initial_cycle {
        config.update_on_start = false;
    }
    Daemon::new(pipeline, config).run().await
}

pub async fn auth(ctx: &AppContext, port: Option<u16>, timeout_secs: u64) -> Result<()> {
    if ctx.config.publisher.target != PublishTarget::WordPress {
        return Err(FeedcastError::Auth(
            "interactive authorization is only needed for WordPress; \
             set instagram.access_token in the config file"
                .into(),
        ));
    }

    let wordpress = &ctx.config.wordpress;
    let port = port.unwrap_or(wordpress.redirect_port);
    let client = OAuthClient::wordpress(wordpress, port, ctx.config.http.timeout())?;

    let listener = OAuthClient::bind_callback(port).await?;
    let url = client.authorization_url()?;

    println!("Opening the authorization page in your browser.");
    println!("If it doesn't open, visit:\n  {}", url);
    if let Err(e) = open::that(url.as_str()) {
        eprintln!("Could not open a browser: {}", e);
    }
    println!(
        "Waiting up to {}s for the redirect to {} ...",
        timeout_secs,
        client.redirect_uri()
    );

    let code = OAuthClient::wait_for_code(listener, Duration::from_secs(timeout_secs)).await?;
    let token = client.exchange_code(&code).await?;

    let cache = TokenCache::in_data_dir()?;
    cache.save(&token)?;
    println!("Access token saved to {}", cache.path().display());
    Ok(())
}

pub fn status(ctx: &AppContext) -> Result<()> {
    let config = &ctx.config;
    println!("{}", daemon_status());

    if config.feed.url.is_empty() {
        println!("Feed:      (not configured)");
    } else {
        println!("Feed:      {}", config.feed.url);
    }
    println!(
        "Interval:  {}",
        format_interval(config.feed.poll_interval_secs()?)
    );

    let store = ctx.store()?;
    println!(
        "Store:     {} ({} of max {} entries)",
        store.location(),
        store.load().len(),
        store.capacity()
    );

    match ctx.platform() {
        Ok(platform) => println!(
            "Platform:  {} ({})",
            platform.name(),
            if platform.is_authenticated() {
                "authenticated"
            } else {
                "no credential"
            }
        ),
        Err(e) => println!("Platform:  not usable: {}", e),
    }

    let shortener = if ctx.shortener()?.is_some() {
        "bitly"
    } else {
        "disabled"
    };
    println!("Shortener: {}", shortener);
    Ok(())
}

pub fn stop() -> Result<()> {
    let pid = stop_daemon()?;
    println!("Stopped daemon (PID {})", pid);
    Ok(())
}
