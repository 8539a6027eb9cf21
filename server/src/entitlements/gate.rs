//! Session gate.
//!
//! Evaluated on every protected request before any entitlement logic:
//! a session must be linked to a Discord identity and, for trial accounts,
//! still inside the trial.

use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};

/// Facts the gate needs about the current session.
#[derive(Debug, Clone, Copy)]
pub struct GateSubject<'a> {
    pub discord_id: Option<&'a str>,
    pub is_trial: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

/// Why a session was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDenial {
    /// No Discord account linked to this user.
    ExternalIdentityRequired,
    /// Trial ended before today.
    TrialExpired,
}

impl GateDenial {
    /// Login page location the client is sent back to.
    #[must_use]
    pub const fn reauth_location(self) -> &'static str {
        match self {
            Self::ExternalIdentityRequired => "/?login=true&error=DiscordRequired",
            Self::TrialExpired => "/?login=true&error=TrialExpired",
        }
    }

    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ExternalIdentityRequired => "DISCORD_REQUIRED",
            Self::TrialExpired => "TRIAL_EXPIRED",
        }
    }
}

/// Gate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Deny(GateDenial),
}

/// Last instant of the trial: 23:59:59.999 on the end date, in `offset`.
pub fn trial_boundary(trial_ends_at: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let end_date = trial_ends_at.with_timezone(&offset).date_naive();
    let last_moment = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);

    // A fixed offset has exactly one mapping for every local time.
    offset
        .from_local_datetime(&end_date.and_time(last_moment))
        .single()
        .map_or(trial_ends_at, |local| local.with_timezone(&Utc))
}

/// Whether a trial account is past its last day.
///
/// Non-trial accounts and trials without an end date never expire.
pub fn trial_expired(
    is_trial: bool,
    trial_ends_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> bool {
    match (is_trial, trial_ends_at) {
        (true, Some(ends_at)) => now > trial_boundary(ends_at, offset),
        _ => false,
    }
}

/// Run the gate for one request.
pub fn evaluate(subject: &GateSubject<'_>, now: DateTime<Utc>, offset: FixedOffset) -> GateDecision {
    if subject.discord_id.is_none_or(str::is_empty) {
        return GateDecision::Deny(GateDenial::ExternalIdentityRequired);
    }

    if trial_expired(subject.is_trial, subject.trial_ends_at, now, offset) {
        return GateDecision::Deny(GateDenial::TrialExpired);
    }

    GateDecision::Proceed
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn linked_trial(ends_at: Option<DateTime<Utc>>) -> GateSubject<'static> {
        GateSubject {
            discord_id: Some("80351110224678912"),
            is_trial: true,
            trial_ends_at: ends_at,
        }
    }

    #[test]
    fn test_unlinked_session_denied() {
        let subject = GateSubject {
            discord_id: None,
            is_trial: false,
            trial_ends_at: None,
        };
        assert_eq!(
            evaluate(&subject, Utc::now(), utc()),
            GateDecision::Deny(GateDenial::ExternalIdentityRequired)
        );
    }

    #[test]
    fn test_blank_discord_id_counts_as_unlinked() {
        let subject = GateSubject {
            discord_id: Some(""),
            is_trial: false,
            trial_ends_at: None,
        };
        assert_eq!(
            evaluate(&subject, Utc::now(), utc()),
            GateDecision::Deny(GateDenial::ExternalIdentityRequired)
        );
    }

    #[test]
    fn test_identity_checked_before_trial() {
        let subject = GateSubject {
            discord_id: None,
            is_trial: true,
            trial_ends_at: Some(at("2020-01-01T00:00:00Z")),
        };
        assert_eq!(
            evaluate(&subject, at("2026-01-01T00:00:00Z"), utc()),
            GateDecision::Deny(GateDenial::ExternalIdentityRequired)
        );
    }

    #[test]
    fn test_trial_allowed_until_end_of_last_day() {
        let subject = linked_trial(Some(at("2026-03-10T08:30:00Z")));

        assert_eq!(
            evaluate(&subject, at("2026-03-10T23:59:59.999Z"), utc()),
            GateDecision::Proceed
        );
        assert_eq!(
            evaluate(&subject, at("2026-03-11T00:00:00.000Z"), utc()),
            GateDecision::Deny(GateDenial::TrialExpired)
        );
    }

    #[test]
    fn test_trial_boundary_follows_configured_offset() {
        // 2026-03-10T20:00Z is already 2026-03-11 at UTC+7.
        let ends_at = at("2026-03-10T20:00:00Z");
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();

        assert_eq!(trial_boundary(ends_at, offset), at("2026-03-11T16:59:59.999Z"));
        assert!(!trial_expired(true, Some(ends_at), at("2026-03-11T16:59:59.999Z"), offset));
        assert!(trial_expired(true, Some(ends_at), at("2026-03-11T17:00:00Z"), offset));
    }

    #[test]
    fn test_non_trial_never_expires() {
        let long_ago = at("2000-01-01T00:00:00Z");
        assert!(!trial_expired(false, Some(long_ago), Utc::now(), utc()));
    }

    #[test]
    fn test_trial_without_end_date_never_expires() {
        let subject = linked_trial(None);
        assert_eq!(evaluate(&subject, Utc::now(), utc()), GateDecision::Proceed);
    }

    #[test]
    fn test_active_trial_proceeds() {
        let subject = linked_trial(Some(Utc::now() + Duration::days(3)));
        assert_eq!(evaluate(&subject, Utc::now(), utc()), GateDecision::Proceed);
    }

    #[test]
    fn test_denial_locations() {
        assert_eq!(
            GateDenial::ExternalIdentityRequired.reauth_location(),
            "/?login=true&error=DiscordRequired"
        );
        assert_eq!(
            GateDenial::TrialExpired.reauth_location(),
            "/?login=true&error=TrialExpired"
        );
    }
}
