//! Activities: workshops, talks, mentorships and the like that students can
//! enroll in.
//!
//! `confirmed_count` and, for some transitions, `status` are derived state;
//! see [`crate::capacity`] for the rules that maintain them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

pub const MAX_NAME_LEN: usize = 150;
pub const MAX_DESCRIPTION_LEN: usize = 200;

// ─── Kind ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
  Workshop,
  ConversationCircle,
  ShortCourse,
  TechnovationMentorship,
  Talk,
  Other,
}

impl ActivityKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Workshop => "workshop",
      Self::ConversationCircle => "conversation_circle",
      Self::ShortCourse => "short_course",
      Self::TechnovationMentorship => "technovation_mentorship",
      Self::Talk => "talk",
      Self::Other => "other",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "workshop" => Some(Self::Workshop),
      "conversation_circle" => Some(Self::ConversationCircle),
      "short_course" => Some(Self::ShortCourse),
      "technovation_mentorship" => Some(Self::TechnovationMentorship),
      "talk" => Some(Self::Talk),
      "other" => Some(Self::Other),
      _ => None,
    }
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle of an activity.
///
/// ```text
/// Draft → Published → EnrollmentOpen ⇄ SeatsExhausted → EnrollmentClosed → Completed
///                         (Cancelled from any non-terminal state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
  Draft,
  Published,
  EnrollmentOpen,
  SeatsExhausted,
  EnrollmentClosed,
  Completed,
  Cancelled,
}

impl ActivityStatus {
  pub const ALL: [Self; 7] = [
    Self::Draft,
    Self::Published,
    Self::EnrollmentOpen,
    Self::SeatsExhausted,
    Self::EnrollmentClosed,
    Self::Completed,
    Self::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Draft => "draft",
      Self::Published => "published",
      Self::EnrollmentOpen => "enrollment_open",
      Self::SeatsExhausted => "seats_exhausted",
      Self::EnrollmentClosed => "enrollment_closed",
      Self::Completed => "completed",
      Self::Cancelled => "cancelled",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "draft" => Some(Self::Draft),
      "published" => Some(Self::Published),
      "enrollment_open" => Some(Self::EnrollmentOpen),
      "seats_exhausted" => Some(Self::SeatsExhausted),
      "enrollment_closed" => Some(Self::EnrollmentClosed),
      "completed" => Some(Self::Completed),
      "cancelled" => Some(Self::Cancelled),
      _ => None,
    }
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Cancelled) }

  /// Statuses shown in the public catalogue.
  pub fn is_listed(self) -> bool {
    matches!(
      self,
      Self::Published
        | Self::EnrollmentOpen
        | Self::SeatsExhausted
        | Self::EnrollmentClosed
    )
  }

  /// Whether an admin edit may move an activity from `self` to `to`.
  ///
  /// `SeatsExhausted` is never chosen by hand, and nothing leaves a terminal
  /// state except a no-op edit.
  pub fn admin_can_set(self, to: Self) -> bool {
    if self == to {
      return true;
    }
    if to == Self::SeatsExhausted || self.is_terminal() {
      return false;
    }
    true
  }
}

// ─── Activity ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
  pub id:                    Uuid,
  pub name:                  String,
  pub kind:                  ActivityKind,
  pub description:           String,
  pub starts_at:             DateTime<Utc>,
  pub ends_at:               Option<DateTime<Utc>>,
  pub location:              String,
  pub online_link:           Option<String>,
  pub total_seats:           u32,
  pub enrollment_opens_at:   DateTime<Utc>,
  pub enrollment_closes_at:  DateTime<Utc>,
  pub cancellation_deadline: Option<DateTime<Utc>>,
  pub status:                ActivityStatus,
  pub created_by:            Uuid,
  /// Cache of the number of confirmed inscriptions. Only ever rewritten by a
  /// recount; never incremented in place.
  pub confirmed_count:       u32,
  pub created_at:            DateTime<Utc>,
  pub updated_at:            DateTime<Utc>,
}

impl Activity {
  /// `open ≤ now ≤ close`, both ends inclusive.
  pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
    self.enrollment_opens_at <= now && now <= self.enrollment_closes_at
  }

  pub fn window_closed(&self, now: DateTime<Utc>) -> bool { now > self.enrollment_closes_at }

  pub fn has_started(&self, now: DateTime<Utc>) -> bool { now >= self.starts_at }

  pub fn available_seats(&self) -> u32 {
    crate::capacity::available_seats(self.total_seats, self.confirmed_count)
  }

  /// The editable fields of this activity, for re-validating after a patch.
  pub fn fields(&self) -> ActivityFields {
    ActivityFields {
      name:                  self.name.clone(),
      kind:                  self.kind,
      description:           self.description.clone(),
      starts_at:             self.starts_at,
      ends_at:               self.ends_at,
      location:              self.location.clone(),
      online_link:           self.online_link.clone(),
      total_seats:           self.total_seats,
      enrollment_opens_at:   self.enrollment_opens_at,
      enrollment_closes_at:  self.enrollment_closes_at,
      cancellation_deadline: self.cancellation_deadline,
      status:                self.status,
    }
  }
}

// ─── Editable fields ─────────────────────────────────────────────────────────

/// Everything an admin supplies when creating an activity. Also the shape an
/// [`ActivityPatch`] is merged into before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFields {
  pub name:                  String,
  pub kind:                  ActivityKind,
  pub description:           String,
  pub starts_at:             DateTime<Utc>,
  pub ends_at:               Option<DateTime<Utc>>,
  pub location:              String,
  pub online_link:           Option<String>,
  pub total_seats:           u32,
  pub enrollment_opens_at:   DateTime<Utc>,
  pub enrollment_closes_at:  DateTime<Utc>,
  pub cancellation_deadline: Option<DateTime<Utc>>,
  #[serde(default = "default_status")]
  pub status:                ActivityStatus,
}

fn default_status() -> ActivityStatus { ActivityStatus::Draft }

impl ActivityFields {
  /// Trim text fields and check every invariant, collecting one message per
  /// violation.
  pub fn validated(mut self) -> Result<Self> {
    self.name = self.name.trim().to_owned();
    self.description = self.description.trim().to_owned();
    self.location = self.location.trim().to_owned();
    self.online_link = self
      .online_link
      .map(|l| l.trim().to_owned())
      .filter(|l| !l.is_empty());

    let mut problems = Vec::new();
    if self.name.is_empty() {
      problems.push("name is required".to_owned());
    } else if self.name.chars().count() > MAX_NAME_LEN {
      problems.push(format!("name cannot exceed {MAX_NAME_LEN} characters"));
    }
    if self.description.is_empty() {
      problems.push("description is required".to_owned());
    } else if self.description.chars().count() > MAX_DESCRIPTION_LEN {
      problems.push(format!(
        "description cannot exceed {MAX_DESCRIPTION_LEN} characters"
      ));
    }
    if self.location.is_empty() {
      problems.push("location is required".to_owned());
    }
    if self.enrollment_closes_at < self.enrollment_opens_at {
      problems.push("enrollment must close after it opens".to_owned());
    }
    if self.ends_at.is_some_and(|end| end < self.starts_at) {
      problems.push("activity must end after it starts".to_owned());
    }
    if self
      .cancellation_deadline
      .is_some_and(|deadline| deadline > self.enrollment_closes_at)
    {
      problems.push(
        "cancellation deadline cannot be after enrollment closes".to_owned(),
      );
    }
    if self.status == ActivityStatus::SeatsExhausted {
      problems.push("status seats_exhausted is derived and cannot be set".to_owned());
    }

    if problems.is_empty() {
      Ok(self)
    } else {
      Err(Error::Validation(problems))
    }
  }
}

/// A partial update. `Some` fields replace the stored value; nullable fields
/// use a nested option so `null` can clear them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActivityPatch {
  pub name:                  Option<String>,
  pub kind:                  Option<ActivityKind>,
  pub description:           Option<String>,
  pub starts_at:             Option<DateTime<Utc>>,
  #[serde(default, with = "nullable")]
  pub ends_at:               Option<Option<DateTime<Utc>>>,
  pub location:              Option<String>,
  #[serde(default, with = "nullable")]
  pub online_link:           Option<Option<String>>,
  pub total_seats:           Option<u32>,
  pub enrollment_opens_at:   Option<DateTime<Utc>>,
  pub enrollment_closes_at:  Option<DateTime<Utc>>,
  #[serde(default, with = "nullable")]
  pub cancellation_deadline: Option<Option<DateTime<Utc>>>,
  pub status:                Option<ActivityStatus>,
}

impl ActivityPatch {
  /// Apply this patch to `current`, then validate the merged record against
  /// the activity's live state.
  pub fn apply_to(self, current: &Activity) -> Result<ActivityFields> {
    let requested_status = self.status;
    let base = current.fields();
    let merged = ActivityFields {
      name:                  self.name.unwrap_or(base.name),
      kind:                  self.kind.unwrap_or(base.kind),
      description:           self.description.unwrap_or(base.description),
      starts_at:             self.starts_at.unwrap_or(base.starts_at),
      ends_at:               self.ends_at.unwrap_or(base.ends_at),
      location:              self.location.unwrap_or(base.location),
      online_link:           self.online_link.unwrap_or(base.online_link),
      total_seats:           self.total_seats.unwrap_or(base.total_seats),
      enrollment_opens_at:   self
        .enrollment_opens_at
        .unwrap_or(base.enrollment_opens_at),
      enrollment_closes_at:  self
        .enrollment_closes_at
        .unwrap_or(base.enrollment_closes_at),
      cancellation_deadline: self
        .cancellation_deadline
        .unwrap_or(base.cancellation_deadline),
      // Placeholder: a stored `SeatsExhausted` must survive an unrelated
      // edit, so status is checked as a transition below instead.
      status:                ActivityStatus::Draft,
    };

    let mut fields = merged.validated()?;
    fields.status = requested_status.unwrap_or(current.status);

    if !current.status.admin_can_set(fields.status) {
      return Err(Error::InvalidTransition {
        from: current.status,
        to:   fields.status,
      });
    }
    if fields.total_seats < current.confirmed_count {
      return Err(Error::Validation(vec![format!(
        "total seats cannot drop below the {} confirmed inscriptions",
        current.confirmed_count
      )]));
    }
    Ok(fields)
  }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
pub(crate) mod nullable {
  use serde::{Deserialize, Deserializer};

  pub fn deserialize<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
  where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
  {
    Option::<T>::deserialize(de).map(Some)
  }
}
