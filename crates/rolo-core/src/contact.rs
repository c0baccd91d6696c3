//! Contact types — the single business entity of the service.
//!
//! A contact is a mutable row: it is created whole, patched field by field,
//! and hard-deleted. The store owns the canonical copy; every value here is a
//! request-scoped snapshot.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

// ─── Persisted representation ────────────────────────────────────────────────

/// A stored contact as returned by every read and write endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
  /// Server-assigned, never reused.
  pub id:              i64,
  pub first_name:      String,
  pub last_name:       String,
  pub email:           String,
  pub phone:           Option<String>,
  pub birthday:        NaiveDate,
  /// Free-form notes.
  pub additional_data: Option<String>,
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// Creation payload. Every non-`Option` field is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
  pub first_name:      String,
  pub last_name:       String,
  pub email:           String,
  #[serde(default)]
  pub phone:           Option<String>,
  pub birthday:        NaiveDate,
  #[serde(default)]
  pub additional_data: Option<String>,
}

impl NewContact {
  /// Attach the identifier assigned by the store.
  pub fn into_contact(self, id: i64) -> Contact {
    Contact {
      id,
      first_name: self.first_name,
      last_name: self.last_name,
      email: self.email,
      phone: self.phone,
      birthday: self.birthday,
      additional_data: self.additional_data,
    }
  }
}

// ─── Partial update ──────────────────────────────────────────────────────────

/// Partial-update payload.
///
/// An absent key leaves the stored field untouched. A present key overwrites
/// it, including with an empty string. Nullable fields are doubly wrapped:
/// `Some(None)` means the caller sent `null` and the field is cleared.
/// Sending `null` for a required field is a deserialisation error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContactPatch {
  #[serde(default, deserialize_with = "present")]
  pub first_name:      Option<String>,
  #[serde(default, deserialize_with = "present")]
  pub last_name:       Option<String>,
  #[serde(default, deserialize_with = "present")]
  pub email:           Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub phone:           Option<Option<String>>,
  #[serde(default, deserialize_with = "present")]
  pub birthday:        Option<NaiveDate>,
  #[serde(default, deserialize_with = "nullable")]
  pub additional_data: Option<Option<String>>,
}

fn present<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  T::deserialize(d).map(Some)
}

fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(d).map(Some)
}

impl ContactPatch {
  /// `true` if applying this patch would change nothing.
  pub fn is_empty(&self) -> bool { *self == Self::default() }

  /// Drop every empty-string and `null` value, so that only "truthy" values
  /// are applied. Used by the legacy update mode, where a caller cannot
  /// clear a field.
  pub fn retain_truthy(self) -> Self {
    fn text(v: Option<String>) -> Option<String> {
      v.filter(|s| !s.is_empty())
    }
    fn nullable_text(v: Option<Option<String>>) -> Option<Option<String>> {
      v.flatten().filter(|s| !s.is_empty()).map(Some)
    }

    Self {
      first_name:      text(self.first_name),
      last_name:       text(self.last_name),
      email:           text(self.email),
      phone:           nullable_text(self.phone),
      birthday:        self.birthday,
      additional_data: nullable_text(self.additional_data),
    }
  }

  /// Apply this patch to an in-memory contact.
  pub fn apply(self, contact: &mut Contact) {
    if let Some(v) = self.first_name {
      contact.first_name = v;
    }
    if let Some(v) = self.last_name {
      contact.last_name = v;
    }
    if let Some(v) = self.email {
      contact.email = v;
    }
    if let Some(v) = self.phone {
      contact.phone = v;
    }
    if let Some(v) = self.birthday {
      contact.birthday = v;
    }
    if let Some(v) = self.additional_data {
      contact.additional_data = v;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ann() -> Contact {
    Contact {
      id:              1,
      first_name:      "Ann".into(),
      last_name:       "Lee".into(),
      email:           "ann@x.com".into(),
      phone:           Some("555-0100".into()),
      birthday:        NaiveDate::from_ymd_opt(1990, 5, 10).unwrap(),
      additional_data: None,
    }
  }

  #[test]
  fn absent_keys_are_none() {
    let patch: ContactPatch = serde_json::from_str("{}").unwrap();
    assert!(patch.is_empty());
  }

  #[test]
  fn null_clears_nullable_field() {
    let patch: ContactPatch =
      serde_json::from_str(r#"{"phone": null, "additional_data": "met at PyCon"}"#).unwrap();
    assert_eq!(patch.phone, Some(None));
    assert_eq!(patch.additional_data, Some(Some("met at PyCon".into())));

    let mut c = ann();
    patch.apply(&mut c);
    assert_eq!(c.phone, None);
    assert_eq!(c.additional_data.as_deref(), Some("met at PyCon"));
  }

  #[test]
  fn null_for_required_field_is_rejected() {
    let res = serde_json::from_str::<ContactPatch>(r#"{"first_name": null}"#);
    assert!(res.is_err());
  }

  #[test]
  fn empty_string_overwrites() {
    let patch: ContactPatch = serde_json::from_str(r#"{"last_name": ""}"#).unwrap();
    let mut c = ann();
    patch.apply(&mut c);
    assert_eq!(c.last_name, "");
  }

  #[test]
  fn retain_truthy_drops_empty_and_null() {
    let patch = serde_json::from_str::<ContactPatch>(
      r#"{"first_name": "", "email": "new@x.com", "phone": null, "additional_data": ""}"#,
    )
    .unwrap()
    .retain_truthy();

    assert_eq!(patch, ContactPatch {
      email: Some("new@x.com".into()),
      ..ContactPatch::default()
    });

    let mut c = ann();
    patch.apply(&mut c);
    assert_eq!(c.first_name, "Ann");
    assert_eq!(c.email, "new@x.com");
    assert_eq!(c.phone.as_deref(), Some("555-0100"));
  }

  #[test]
  fn new_contact_optional_fields_default() {
    let input: NewContact = serde_json::from_str(
      r#"{"first_name":"Ann","last_name":"Lee","email":"ann@x.com","birthday":"1990-05-10"}"#,
    )
    .unwrap();
    let c = input.into_contact(7);
    assert_eq!(c.id, 7);
    assert_eq!(c.phone, None);
    assert_eq!(c.additional_data, None);
  }
}
