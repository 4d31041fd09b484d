//! Direct delivery: group recipients by domain and send to each domain's MX.

use std::sync::Arc;

use hickory_resolver::TokioResolver;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::client::{Client, ClientConfig};
use crate::error::{Error, Result};
use crate::types::{Address, Message};

/// Port used for direct delivery.
pub const SMTP_PORT: u16 = 25;

/// One MX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    /// Lower is preferred.
    pub preference: u16,
    /// Exchange hostname without the trailing dot.
    pub exchange: String,
}

/// Looks up MX records for a domain.
pub trait MxResolver: Send + Sync {
    /// Returns the MX records of `domain` in any order.
    fn lookup_mx(&self, domain: &str) -> impl Future<Output = Result<Vec<MxRecord>>> + Send;
}

/// [`MxResolver`] backed by the system DNS configuration.
pub struct DnsResolver {
    resolver: TokioResolver,
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver").finish_non_exhaustive()
    }
}

impl DnsResolver {
    /// Creates a resolver from the system configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system resolver configuration cannot be read.
    pub fn new() -> Result<Self> {
        let resolver = TokioResolver::builder_tokio()
            .map_err(|err| Error::Config(format!("Failed to create resolver: {err}")))?
            .build();
        Ok(Self { resolver })
    }
}

impl MxResolver for DnsResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>> {
        let response = self
            .resolver
            .mx_lookup(domain)
            .await
            .map_err(|err| Error::Resolve {
                domain: domain.to_string(),
                reason: err.to_string(),
            })?;

        Ok(response
            .iter()
            .map(|mx| MxRecord {
                preference: mx.preference(),
                exchange: mx.exchange().to_string().trim_end_matches('.').to_string(),
            })
            .collect())
    }
}

/// Options for [`sendmail`].
#[derive(Debug, Clone, Default)]
pub struct SendmailOptions {
    /// Send everything through this server instead of resolving MX records.
    pub smtp: Option<ClientConfig>,
}

/// Outcome of delivering to one domain (or to the configured relay).
#[derive(Debug)]
pub struct Delivery {
    /// Recipient domain, or the relay host.
    pub domain: String,
    /// Host the message was sent to.
    pub target: String,
    /// Result of the transaction.
    pub result: Result<()>,
}

/// Splits a message into one message per recipient domain, in order of first
/// appearance.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if a recipient has no domain.
pub fn group_by_domain(message: &Message) -> Result<Vec<(String, Message)>> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();

    for recipient in &message.recipients {
        let domain = Address::new(recipient.as_str())?.domain();
        match groups.iter_mut().find(|(known, _)| *known == domain) {
            Some((_, recipients)) => recipients.push(recipient.clone()),
            None => groups.push((domain, vec![recipient.clone()])),
        }
    }

    Ok(groups
        .into_iter()
        .map(|(domain, recipients)| {
            let message = message.with_recipients(recipients);
            (domain, message)
        })
        .collect())
}

/// Picks the preferred exchange for `domain`, or the domain itself when the
/// lookup fails or returns nothing.
pub async fn resolve_target<R: MxResolver>(resolver: &R, domain: &str) -> String {
    match resolver.lookup_mx(domain).await {
        Ok(records) => records
            .into_iter()
            .min_by_key(|record| record.preference)
            .map_or_else(|| domain.to_string(), |record| record.exchange),
        Err(err) => {
            debug!(%domain, error = %err, "MX lookup failed, using the domain");
            domain.to_string()
        }
    }
}

/// Sends a message using the system resolver.
///
/// # Errors
///
/// Returns an error if a recipient address is invalid or the resolver cannot
/// be created. Per-domain delivery failures are reported in the returned
/// [`Delivery`] list.
pub async fn sendmail(message: &Message, options: SendmailOptions) -> Result<Vec<Delivery>> {
    if let Some(config) = options.smtp {
        return Ok(vec![send_to(config.host.clone(), config, message.clone()).await]);
    }
    let resolver = DnsResolver::new()?;
    sendmail_with(Arc::new(resolver), message, SendmailOptions::default()).await
}

/// Sends a message, resolving delivery targets with `resolver`.
///
/// With [`SendmailOptions::smtp`] set, the whole message goes to that server.
/// Otherwise each recipient domain is delivered to concurrently on port 25.
/// Nothing is retried.
///
/// # Errors
///
/// Returns an error if a recipient address is invalid.
pub async fn sendmail_with<R: MxResolver + 'static>(
    resolver: Arc<R>,
    message: &Message,
    options: SendmailOptions,
) -> Result<Vec<Delivery>> {
    if let Some(config) = options.smtp {
        return Ok(vec![send_to(config.host.clone(), config, message.clone()).await]);
    }

    let groups = group_by_domain(message)?;
    let mut tasks = JoinSet::new();

    for (index, (domain, message)) in groups.into_iter().enumerate() {
        let resolver = Arc::clone(&resolver);
        tasks.spawn(async move {
            let target = resolve_target(resolver.as_ref(), &domain).await;
            let config = ClientConfig::builder(target).port(SMTP_PORT).build();
            (index, send_to(domain, config, message).await)
        });
    }

    let mut deliveries = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(delivery) => deliveries.push(delivery),
            Err(err) => warn!(error = %err, "delivery task failed"),
        }
    }
    deliveries.sort_by_key(|(index, _)| *index);

    Ok(deliveries.into_iter().map(|(_, delivery)| delivery).collect())
}

async fn send_to(domain: String, config: ClientConfig, message: Message) -> Delivery {
    let target = config.host.clone();
    debug!(%domain, %target, port = config.port, "delivering");

    let result = async {
        let mut client = Client::connect(config).await?;
        client.send(&message).await?;
        client.quit().await
    }
    .await;

    if let Err(err) = &result {
        warn!(%domain, %target, error = %err, "delivery failed");
    }

    Delivery {
        domain,
        target,
        result,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticResolver(HashMap<String, Vec<MxRecord>>);

    impl MxResolver for StaticResolver {
        async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>> {
            self.0.get(domain).cloned().ok_or_else(|| Error::Resolve {
                domain: domain.to_string(),
                reason: "no records".into(),
            })
        }
    }

    fn mx(preference: u16, exchange: &str) -> MxRecord {
        MxRecord {
            preference,
            exchange: exchange.to_string(),
        }
    }

    #[test]
    fn test_group_by_domain_keeps_first_seen_order() {
        let message = Message::new("a@localhost", "body")
            .to("x@b.example")
            .to("y@a.example")
            .to("z@B.example");

        let groups = group_by_domain(&message).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "b.example");
        assert_eq!(groups[0].1.recipients, vec!["x@b.example", "z@B.example"]);
        assert_eq!(groups[1].0, "a.example");
        assert_eq!(groups[1].1.recipients, vec!["y@a.example"]);
        assert_eq!(groups[1].1.message, "body");
        assert_eq!(groups[1].1.sender, "a@localhost");
    }

    #[test]
    fn test_group_by_domain_rejects_bad_address() {
        let message = Message::new("a@localhost", "body").to("nobody");
        assert!(matches!(
            group_by_domain(&message),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_target_prefers_lowest() {
        let resolver = StaticResolver(HashMap::from([(
            "example.com".to_string(),
            vec![mx(20, "mx2.example.com"), mx(10, "mx1.example.com")],
        )]));
        assert_eq!(
            resolve_target(&resolver, "example.com").await,
            "mx1.example.com"
        );
    }

    #[tokio::test]
    async fn test_resolve_target_falls_back_to_domain() {
        let resolver = StaticResolver(HashMap::from([("empty.example".to_string(), vec![])]));
        assert_eq!(
            resolve_target(&resolver, "missing.example").await,
            "missing.example"
        );
        assert_eq!(
            resolve_target(&resolver, "empty.example").await,
            "empty.example"
        );
    }
}
