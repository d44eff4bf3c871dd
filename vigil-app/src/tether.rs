use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use vigil_bot::onebot::{OneBotDispatcher, OneBotSettings};
use vigil_common::{AccountTarget, Clock, Result, SystemClock, VigilError};
use vigil_config::{OneBotConfig, VigilConfig, non_empty};
use vigil_social::x::{
    ApiCredentials, CommandFetcher, DelegatedTier, EmbeddedTier, OfficialTier, Orchestrator,
    SyndicationScraper, TimeWindow, TwitterApi,
};

/// One fully wired run: roster, acquisition, delivery.
pub struct Tether {
    roster: Vec<AccountTarget>,
    orchestrator: Orchestrator,
    dispatcher: OneBotDispatcher,
    label: String,
}

impl Tether {
    pub async fn run(self) -> Result<()> {
        tracing::info!(accounts = self.roster.len(), tiers = ?self.orchestrator.tiers(), "vigil.run.start");

        let report = self
            .orchestrator
            .fetch(&self.roster)
            .await
            .inspect_err(|e| tracing::error!(error=%e, "vigil.run.fetch_exhausted"))
            .context("acquisition failed")?;

        tracing::info!(
            tier=%report.tier,
            items = report.items.len(),
            skipped_accounts = report.skipped_accounts().len(),
            "vigil.run.fetched"
        );

        // deliver() only errors before any request is made
        let delivery = self
            .dispatcher
            .deliver(&report.items, &self.label)
            .await
            .map_err(|e| VigilError::Config(e.to_string()))?;
        tracing::info!(
            ok = delivery.succeeded(),
            failed = delivery.failed(),
            "vigil.run.delivered"
        );
        delivery.into_result().context("digest delivery failed")?;
        Ok(())
    }
}

fn onebot_settings(cfg: &OneBotConfig) -> OneBotSettings {
    OneBotSettings {
        endpoint: cfg.api.trim().to_string(),
        access_token: non_empty(&cfg.access_token).map(str::to_string),
        group_id: cfg.group_id,
        user_id: cfg.user_id,
        timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
    }
}

pub fn build_from_config(cfg: &VigilConfig, label: &str) -> Result<Tether> {
    let x = &cfg.crawler.x;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let roster: Vec<AccountTarget> = x.roster().into_iter().map(AccountTarget::from).collect();
    if roster.is_empty() {
        tracing::warn!("vigil.config.empty_roster");
    }

    // Tier 1: external crawler
    let fetcher = CommandFetcher::new(x.delegated.program.clone(), x.delegated.args.clone())
        .with_working_dir(x.delegated.working_dir.clone())
        .with_timeout(Duration::from_secs(x.delegated.timeout_secs.max(1)));

    // Tier 2: official API, skipped at run time when uncredentialed
    let credentials = ApiCredentials::from_parts(
        non_empty(&x.bearer_token),
        non_empty(&x.api_key),
        non_empty(&x.api_secret),
    );
    let api = TwitterApi::new()
        .map_err(|e| VigilError::Config(format!("building X API client: {e}")))?;

    // Tier 3: built-in scraper, optionally proxied
    let scraper = SyndicationScraper::new(cfg.proxy.crawler_proxy())
        .map_err(|e| VigilError::Config(format!("building syndication scraper: {e}")))?;

    let orchestrator = Orchestrator::new(TimeWindow::last_24_hours(clock.clone()))
        .with_strategy(DelegatedTier::new(fetcher))
        .with_strategy(OfficialTier::new(api, credentials))
        .with_strategy(EmbeddedTier::new(scraper));

    let dispatcher = OneBotDispatcher::new(onebot_settings(&cfg.bot.onebot)).with_clock(clock);

    Ok(Tether {
        roster,
        orchestrator,
        dispatcher,
        label: label.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vigil_common::IntelligenceItem;
    use vigil_config::VigilConfigLoader;
    use vigil_social::x::{FetchStrategy, FetchTier, TierReport};

    struct OnePost;

    #[async_trait]
    impl FetchStrategy for OnePost {
        fn tier(&self) -> FetchTier {
            FetchTier::EmbeddedScraper
        }

        async fn fetch(&self, _: &[AccountTarget], _: &TimeWindow) -> TierReport {
            TierReport {
                items: IntelligenceItem::new("https://twitter.com/a/status/1", "@a: hi")
                    .into_iter()
                    .collect(),
                failures: Vec::new(),
                aborted: None,
            }
        }
    }

    fn load(yaml: &str) -> VigilConfig {
        VigilConfigLoader::new().with_yaml_str(yaml).load().unwrap()
    }

    #[test]
    fn wires_every_tier_in_priority_order() {
        let cfg = load(
            r#"
crawler:
  x:
    accounts: ["@alice", "bob"]
bot:
  onebot:
    api: "http://127.0.0.1:3000"
    group_id: 42
"#,
        );
        let tether = build_from_config(&cfg, "Daily").unwrap();
        assert_eq!(tether.orchestrator.tiers(), FetchTier::PRIORITY.to_vec());
        assert_eq!(
            tether.roster,
            vec![AccountTarget::new("alice"), AccountTarget::new("bob")]
        );
        assert_eq!(tether.label, "Daily");
    }

    #[test]
    fn onebot_settings_map_blank_token_to_none() {
        let cfg = OneBotConfig {
            api: " http://bot/ ".into(),
            access_token: Some("   ".into()),
            group_id: Some(0),
            user_id: Some(7),
            timeout_secs: 3,
        };
        let s = onebot_settings(&cfg);
        assert_eq!(s.endpoint, "http://bot/");
        assert!(s.access_token.is_none());
        assert_eq!(s.timeout, Duration::from_secs(3));
        assert_eq!(s.destinations().len(), 1);
    }

    #[tokio::test]
    async fn empty_roster_surfaces_exhaustion() {
        let cfg = load(
            r#"
crawler:
  x:
    accounts: []
    accounts_file: "/no/such/roster.json"
bot:
  onebot:
    api: "http://127.0.0.1:9"
    group_id: 1
"#,
        );
        let err = build_from_config(&cfg, "X").unwrap().run().await.unwrap_err();
        let VigilError::Other(inner) = err else {
            panic!("unexpected error: {err}");
        };
        assert!(format!("{inner:#}").contains("no tier produced posts"), "{inner:#}");
    }

    #[tokio::test]
    async fn unaddressed_bot_is_a_config_error() {
        let tether = Tether {
            roster: vec![AccountTarget::new("a")],
            orchestrator: Orchestrator::new(TimeWindow::last_24_hours(Arc::new(SystemClock)))
                .with_strategy(OnePost),
            dispatcher: OneBotDispatcher::new(OneBotSettings::new("http://127.0.0.1:9")),
            label: "X".into(),
        };
        let err = tether.run().await.unwrap_err();
        match err {
            VigilError::Config(msg) => assert!(msg.contains("destination"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
