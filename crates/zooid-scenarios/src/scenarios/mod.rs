//! Scenario catalog
//!
//! Each scenario is one end-to-end workflow against the relay under test. The
//! catalog is static; the runner filters it by name and skips scenarios whose
//! actors are not configured.

use std::fmt;

use futures::future::BoxFuture;
use futures::FutureExt;
use zooid_core::HarnessConfig;

use crate::context::ScenarioContext;

pub mod deletion;
pub mod membership;
pub mod nip01;
pub mod nip11;
pub mod nip42;

pub type ScenarioFn = fn(ScenarioContext) -> BoxFuture<'static, anyhow::Result<()>>;

/// Who takes part in a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actors {
    /// Unauthenticated raw connections only
    Raw,
    Admin,
    /// Admin plus the configured secondary identity
    AdminAndMember,
    /// Admin plus a freshly generated key
    AdminAndEphemeral,
    /// A freshly generated key only
    Ephemeral,
}

impl Actors {
    pub fn needs_member(self) -> bool {
        self == Actors::AdminAndMember
    }
}

#[derive(Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub actors: Actors,
    run: ScenarioFn,
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("actors", &self.actors)
            .finish()
    }
}

impl Scenario {
    pub fn new(
        name: &'static str,
        description: &'static str,
        actors: Actors,
        run: ScenarioFn,
    ) -> Self {
        Self {
            name,
            description,
            actors,
            run,
        }
    }

    pub fn run(&self, ctx: ScenarioContext) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.run)(ctx)
    }

    /// Why this scenario cannot run with `config`, if it cannot
    pub fn skip_reason(&self, config: &HarnessConfig) -> Option<String> {
        if self.actors.needs_member() && config.member.is_none() {
            return Some("requires a secondary identity (--identity2)".to_string());
        }
        None
    }

    /// Whether the name contains any of `filters`; no filters matches everything
    pub fn matches(&self, filters: &[String]) -> bool {
        filters.is_empty() || filters.iter().any(|filter| self.name.contains(filter.as_str()))
    }
}

/// Every scenario, in run order
pub fn catalog() -> Vec<Scenario> {
    vec![
        Scenario::new(
            "nip01-kind0-metadata",
            "kind 0 metadata round-trips",
            Actors::Admin,
            |ctx| nip01::kind0_metadata(ctx).boxed(),
        ),
        Scenario::new(
            "nip01-kind1-text-note",
            "kind 1 text note round-trips",
            Actors::Admin,
            |ctx| nip01::kind1_text_note(ctx).boxed(),
        ),
        Scenario::new(
            "nip11-relay-info",
            "relay info lists NIP-11 and NIP-42",
            Actors::Raw,
            |ctx| nip11::relay_info(ctx).boxed(),
        ),
        Scenario::new(
            "nip42-auth-challenge",
            "relay sends AUTH after connect",
            Actors::Raw,
            |ctx| nip42::auth_challenge(ctx).boxed(),
        ),
        Scenario::new(
            "nip42-unauth-event",
            "EVENT before auth is refused with auth-required",
            Actors::Raw,
            |ctx| nip42::unauth_event(ctx).boxed(),
        ),
        Scenario::new(
            "nip42-unauth-req",
            "REQ before auth is closed with auth-required",
            Actors::Raw,
            |ctx| nip42::unauth_req(ctx).boxed(),
        ),
        Scenario::new(
            "nip43-nonmember-req",
            "authenticated non-member REQ is restricted",
            Actors::Ephemeral,
            |ctx| nip42::nonmember_req(ctx).boxed(),
        ),
        Scenario::new(
            "auth-mismatch-pubkey",
            "event signed by another key after auth is restricted",
            Actors::AdminAndMember,
            |ctx| nip42::auth_mismatch_pubkey(ctx).boxed(),
        ),
        Scenario::new(
            "invite-claim",
            "admins receive an invite with a claim",
            Actors::Admin,
            |ctx| membership::invite_claim(ctx).boxed(),
        ),
        Scenario::new(
            "join-valid-claim",
            "join with a valid claim succeeds or is a duplicate",
            Actors::AdminAndMember,
            |ctx| membership::join_valid_claim(ctx).boxed(),
        ),
        Scenario::new(
            "join-existing-member",
            "second join by a member succeeds or is a duplicate",
            Actors::AdminAndMember,
            |ctx| membership::join_existing_member(ctx).boxed(),
        ),
        Scenario::new(
            "nip43-relay-members-list",
            "joined member is listed",
            Actors::AdminAndMember,
            |ctx| membership::members_list(ctx).boxed(),
        ),
        Scenario::new(
            "nip43-leave-removes-member",
            "leave removes the member from the list",
            Actors::AdminAndEphemeral,
            |ctx| membership::leave_removes_member(ctx).boxed(),
        ),
        Scenario::new(
            "nip43-relay-member-events",
            "add and remove member events are queryable by #p",
            Actors::AdminAndEphemeral,
            |ctx| membership::member_events(ctx).boxed(),
        ),
        Scenario::new(
            "nip09-delete-single",
            "kind 5 deletes a prior event",
            Actors::AdminAndMember,
            |ctx| deletion::delete_single(ctx).boxed(),
        ),
        Scenario::new(
            "nip09-delete-multiple",
            "kind 5 deletes several targets",
            Actors::AdminAndMember,
            |ctx| deletion::delete_multiple(ctx).boxed(),
        ),
        Scenario::new(
            "nip09-delete-partial",
            "unknown target does not block valid deletions",
            Actors::AdminAndMember,
            |ctx| deletion::delete_partial(ctx).boxed(),
        ),
        Scenario::new(
            "nip09-delete-addressable",
            "addressable event deleted via a tag",
            Actors::AdminAndMember,
            |ctx| deletion::delete_addressable(ctx).boxed(),
        ),
        Scenario::new(
            "nip09-delete-mixed-authors",
            "mixed-author deletion is blocked and deletes nothing",
            Actors::AdminAndMember,
            |ctx| deletion::delete_mixed_authors(ctx).boxed(),
        ),
    ]
}

/// Catalog entries whose names match `filters`
pub fn select(filters: &[String]) -> Vec<Scenario> {
    catalog()
        .into_iter()
        .filter(|scenario| scenario.matches(filters))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use zooid_core::{ActorConfig, Timeouts};

    #[test]
    fn test_catalog_names_are_unique() {
        let names: HashSet<_> = catalog().iter().map(|scenario| scenario.name).collect();
        assert_eq!(names.len(), catalog().len());
        assert_eq!(catalog().len(), 19);
    }

    #[test]
    fn test_filters_match_substrings() {
        let deletion = select(&["nip09".to_string()]);
        assert_eq!(deletion.len(), 5);
        assert!(deletion.iter().all(|scenario| scenario.name.starts_with("nip09-")));

        let either = select(&["kind0".to_string(), "invite-claim".to_string()]);
        let names: Vec<_> = either.iter().map(|scenario| scenario.name).collect();
        assert_eq!(names, vec!["nip01-kind0-metadata", "invite-claim"]);

        assert_eq!(select(&[]).len(), catalog().len());
        assert!(select(&["no-such-scenario".to_string()]).is_empty());
    }

    #[test]
    fn test_member_scenarios_skip_without_secondary_identity() {
        let relay_url = "ws://localhost:3334".to_string();
        let config = HarnessConfig {
            admin: ActorConfig::ephemeral(relay_url.clone(), "relay_admin").unwrap(),
            member: None,
            relay_url,
            timeouts: Timeouts::default(),
        };

        for scenario in catalog() {
            let skipped = scenario.skip_reason(&config).is_some();
            assert_eq!(skipped, scenario.actors == Actors::AdminAndMember, "{}", scenario.name);
        }
    }
}
