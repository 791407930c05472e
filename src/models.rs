use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Phone {
    pub id: i64,
    pub label: String,
    pub number: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Email {
    pub id: i64,
    pub label: String,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Address {
    pub id: i64,
    pub label: String,
    pub street: String,
    pub city: String,
    pub country: String,
    pub postal: String,
}

/// A fully hydrated card, as returned by `GET /api/cards/{id}`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Card {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub company: String,
    pub website: String,
    pub notes: String,
    pub photo_url: String,
    pub phones: Vec<Phone>,
    pub emails: Vec<Email>,
    pub addresses: Vec<Address>,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// List entry: scalar fields and tags, without the child collections.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CardSummary {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub company: String,
    pub website: String,
    pub notes: String,
    pub photo_url: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PhoneInput {
    pub label: String,
    pub number: String,
}

impl PhoneInput {
    pub fn is_storable(&self) -> bool {
        !self.number.trim().is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct EmailInput {
    pub label: String,
    pub address: String,
}

impl EmailInput {
    pub fn is_storable(&self) -> bool {
        !self.address.trim().is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AddressInput {
    pub label: String,
    pub street: String,
    pub city: String,
    pub country: String,
    pub postal: String,
}

impl AddressInput {
    /// An address with neither street nor city is dropped.
    pub fn is_storable(&self) -> bool {
        !self.street.trim().is_empty() || !self.city.trim().is_empty()
    }
}

/// The aggregate shape consumed by `Store::create` and `Store::update`.
#[derive(Debug, Clone, Default)]
pub struct CardInput {
    pub name: String,
    pub title: String,
    pub company: String,
    pub website: String,
    pub notes: String,
    pub phones: Vec<PhoneInput>,
    pub emails: Vec<EmailInput>,
    pub addresses: Vec<AddressInput>,
    pub tags: Vec<String>,
}

/// Maps a stored relative path (`uploads/<file>`) to the URL clients fetch it from.
pub fn photo_url(photo_path: &str) -> String {
    if photo_path.is_empty() {
        String::new()
    } else {
        format!("/{photo_path}")
    }
}
