//! Accounts: identity, role and the anonymized tombstone left behind when a
//! user removes their own account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Passwords shorter than this are rejected at signup and admin creation.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Domain used for the sentinel email of an anonymized account.
pub const ANONYMIZED_EMAIL_DOMAIN: &str = "anon.meninas.digitais";

// ─── Role ────────────────────────────────────────────────────────────────────

/// The closed set of account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
  Student,
  Admin,
  SuperAdmin,
}

impl Role {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Student => "student",
      Self::Admin => "admin",
      Self::SuperAdmin => "super-admin",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "student" => Some(Self::Student),
      "admin" => Some(Self::Admin),
      "super-admin" => Some(Self::SuperAdmin),
      _ => None,
    }
  }
}

impl std::fmt::Display for Role {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── User ────────────────────────────────────────────────────────────────────

/// A persisted account. The credential hash is deliberately not part of this
/// type; it only travels through [`crate::store::Credentials`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id:         Uuid,
  pub full_name:  String,
  pub email:      String,
  pub role:       Role,
  pub is_active:  bool,
  pub phone:      Option<String>,
  pub school:     Option<String>,
  pub grade:      Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl User {
  pub fn is_anonymized(&self) -> bool { is_reserved_email(&self.email) }

  pub fn public_profile(&self) -> PublicProfile {
    PublicProfile {
      id:        self.id,
      full_name: self.full_name.clone(),
      email:     self.email.clone(),
      school:    self.school.clone(),
      grade:     self.grade.clone(),
    }
  }
}

/// What an admin sees about an enrollee on a roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
  pub id:        Uuid,
  pub full_name: String,
  pub email:     String,
  pub school:    Option<String>,
  pub grade:     Option<String>,
}

// ─── NewUser ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::OutreachStore::create_user`].
/// `password_hash` must already be a PHC string; hashing is the caller's job.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub full_name:     String,
  pub email:         String,
  pub password_hash: String,
  pub role:          Role,
  pub phone:         Option<String>,
  pub school:        Option<String>,
  pub grade:         Option<String>,
}

impl NewUser {
  /// Trim and lowercase the email, trim the free-text fields, and check what
  /// can be checked without the store.
  pub fn normalized(mut self) -> Result<Self> {
    self.full_name = self.full_name.trim().to_owned();
    self.email = normalize_email(&self.email);
    self.phone = trimmed(self.phone);
    self.school = trimmed(self.school);
    self.grade = trimmed(self.grade);

    let mut problems = Vec::new();
    if self.full_name.is_empty() {
      problems.push("full name is required".to_owned());
    }
    check_email(&self.email, &mut problems);
    if problems.is_empty() {
      Ok(self)
    } else {
      Err(Error::Validation(problems))
    }
  }
}

// ─── ProfilePatch ────────────────────────────────────────────────────────────

/// Edit of an account's personal fields, by its owner or a super-admin.
///
/// Absent fields keep their value. For the optional fields, `null` or a
/// blank string clears the value. Role, activation and credentials are not
/// part of a profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfilePatch {
  pub full_name: Option<String>,
  pub email:     Option<String>,
  #[serde(default, with = "crate::activity::nullable")]
  pub phone:     Option<Option<String>>,
  #[serde(default, with = "crate::activity::nullable")]
  pub school:    Option<Option<String>>,
  #[serde(default, with = "crate::activity::nullable")]
  pub grade:     Option<Option<String>>,
}

impl ProfilePatch {
  /// The account as it would look after the edit, normalized the same way as
  /// at signup. `updated_at` is left for the store to stamp.
  pub fn apply_to(self, current: &User) -> Result<User> {
    if current.is_anonymized() {
      return Err(Error::Rejected("an anonymized account cannot be edited".into()));
    }

    let mut next = current.clone();
    if let Some(name) = self.full_name {
      next.full_name = name.trim().to_owned();
    }
    if let Some(email) = self.email {
      next.email = normalize_email(&email);
    }
    if let Some(phone) = self.phone {
      next.phone = trimmed(phone);
    }
    if let Some(school) = self.school {
      next.school = trimmed(school);
    }
    if let Some(grade) = self.grade {
      next.grade = trimmed(grade);
    }

    let mut problems = Vec::new();
    if next.full_name.is_empty() {
      problems.push("full name is required".to_owned());
    }
    check_email(&next.email, &mut problems);
    if problems.is_empty() {
      Ok(next)
    } else {
      Err(Error::Validation(problems))
    }
  }
}

fn trimmed(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

/// Addresses under the anonymization domain belong to tombstones only.
pub fn is_reserved_email(email: &str) -> bool {
  email
    .rsplit_once('@')
    .is_some_and(|(_, domain)| domain.eq_ignore_ascii_case(ANONYMIZED_EMAIL_DOMAIN))
}

fn check_email(email: &str, problems: &mut Vec<String>) {
  if !is_plausible_email(email) {
    problems.push("a valid email is required".to_owned());
  } else if is_reserved_email(email) {
    problems.push(format!("emails under {ANONYMIZED_EMAIL_DOMAIN} are reserved"));
  }
}

/// A deliberately loose shape check: one `@`, a non-empty local part, and a
/// dotted domain with no whitespace anywhere.
pub fn is_plausible_email(email: &str) -> bool {
  if email.chars().any(char::is_whitespace) {
    return false;
  }
  match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty()
        && !domain.contains('@')
        && domain
          .rsplit_once('.')
          .is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2)
    }
    None => false,
  }
}

pub fn validate_password(password: &str) -> Result<()> {
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(Error::Validation(vec![format!(
      "password must have at least {MIN_PASSWORD_LEN} characters"
    )]));
  }
  Ok(())
}

// ─── Anonymization ───────────────────────────────────────────────────────────

/// Replacement values written over an account's PII when it is anonymized.
#[derive(Debug, Clone)]
pub struct Tombstone {
  pub full_name: String,
  pub email:     String,
}

impl Tombstone {
  pub fn for_user(id: Uuid) -> Self {
    let simple = id.simple().to_string();
    let tail = &simple[simple.len() - 6..];
    Self {
      full_name: format!("Anonymous user {tail}"),
      email:     format!("deleted-{simple}@{ANONYMIZED_EMAIL_DOMAIN}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn new_user(email: &str) -> NewUser {
    NewUser {
      full_name:     "  Ada Lovelace ".into(),
      email:         email.into(),
      password_hash: "$argon2id$stub".into(),
      role:          Role::Student,
      phone:         Some("   ".into()),
      school:        Some(" EE Central ".into()),
      grade:         None,
    }
  }

  #[test]
  fn normalization_lowercases_email_and_trims_fields() {
    let user = new_user("  Ada@Example.ORG ").normalized().unwrap();
    assert_eq!(user.email, "ada@example.org");
    assert_eq!(user.full_name, "Ada Lovelace");
    assert_eq!(user.phone, None);
    assert_eq!(user.school.as_deref(), Some("EE Central"));
  }

  #[test]
  fn normalization_reports_every_bad_field() {
    let mut input = new_user("not-an-email");
    input.full_name = " ".into();
    match input.normalized() {
      Err(Error::Validation(details)) => assert_eq!(details.len(), 2),
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[test]
  fn email_shapes() {
    assert!(is_plausible_email("a@b.co"));
    assert!(!is_plausible_email("a@b"));
    assert!(!is_plausible_email("@b.com"));
    assert!(!is_plausible_email("a b@c.com"));
    assert!(!is_plausible_email("a@b@c.com"));
  }

  #[test]
  fn short_passwords_are_rejected() {
    assert!(validate_password("12345").is_err());
    assert!(validate_password("123456").is_ok());
  }

  #[test]
  fn role_strings_round_trip() {
    for role in [Role::Student, Role::Admin, Role::SuperAdmin] {
      assert_eq!(Role::parse(role.as_str()), Some(role));
    }
    assert_eq!(Role::parse("superadmin"), None);
  }

  #[test]
  fn tombstone_marks_user_as_anonymized() {
    let id = Uuid::new_v4();
    let stone = Tombstone::for_user(id);
    let now = Utc::now();
    let user = User {
      id,
      full_name: stone.full_name,
      email: stone.email,
      role: Role::Student,
      is_active: false,
      phone: None,
      school: None,
      grade: None,
      created_at: now,
      updated_at: now,
    };
    assert!(user.is_anonymized());
  }

  fn stored(now: DateTime<Utc>) -> User {
    User {
      id: Uuid::new_v4(),
      full_name: "Ada Lovelace".into(),
      email: "ada@example.org".into(),
      role: Role::Student,
      is_active: true,
      phone: Some("555-0100".into()),
      school: Some("EE Central".into()),
      grade: Some("9".into()),
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn reserved_domain_is_refused_at_signup() {
    let input = new_user(&format!("Someone@{}", ANONYMIZED_EMAIL_DOMAIN.to_uppercase()));
    match input.normalized() {
      Err(Error::Validation(details)) => assert!(details[0].contains("reserved")),
      other => panic!("expected validation error, got {other:?}"),
    }
  }

  #[test]
  fn profile_patch_keeps_absent_fields_and_clears_blank_ones() {
    let current = stored(Utc::now());
    let patch: ProfilePatch = serde_json::from_value(serde_json::json!({
      "fullName": " Ada King ",
      "phone": null,
      "school": "  ",
    }))
    .unwrap();

    let next = patch.apply_to(&current).unwrap();
    assert_eq!(next.full_name, "Ada King");
    assert_eq!(next.email, current.email);
    assert_eq!(next.phone, None);
    assert_eq!(next.school, None);
    assert_eq!(next.grade.as_deref(), Some("9"));
    assert_eq!(next.role, Role::Student);
  }

  #[test]
  fn profile_patch_refuses_role_and_unknown_fields() {
    let role = serde_json::from_value::<ProfilePatch>(serde_json::json!({ "role": "admin" }));
    assert!(role.is_err());
    let active = serde_json::from_value::<ProfilePatch>(serde_json::json!({ "isActive": false }));
    assert!(active.is_err());
  }

  #[test]
  fn profile_patch_validates_like_signup() {
    let current = stored(Utc::now());
    let patch = ProfilePatch {
      full_name: Some(" ".into()),
      email: Some(format!("x@{ANONYMIZED_EMAIL_DOMAIN}")),
      ..Default::default()
    };
    match patch.apply_to(&current) {
      Err(Error::Validation(details)) => assert_eq!(details.len(), 2),
      other => panic!("expected validation error, got {other:?}"),
    }

    let email = ProfilePatch {
      email: Some("  Ada.King@Example.ORG ".into()),
      ..Default::default()
    };
    assert_eq!(email.apply_to(&current).unwrap().email, "ada.king@example.org");
  }

  #[test]
  fn anonymized_accounts_cannot_be_edited() {
    let mut current = stored(Utc::now());
    current.email = Tombstone::for_user(current.id).email;
    let patch = ProfilePatch {
      full_name: Some("Back again".into()),
      ..Default::default()
    };
    assert!(matches!(patch.apply_to(&current), Err(Error::Rejected(_))));
  }
}
