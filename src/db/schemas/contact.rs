//! Emergency and personal contact documents

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::{GeoJsonPoint, Metadata};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::geo::GeoPoint;
use crate::proximity::{ContactType, EmergencyContact, PersonalContact};

/// Collection name for public responders
pub const EMERGENCY_CONTACT_COLLECTION: &str = "emergency_contacts";

/// Collection name for users' own contacts
pub const PERSONAL_CONTACT_COLLECTION: &str = "personal_contacts";

/// Public responder stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EmergencyContactDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub contact_id: String,
    pub name: String,
    pub phone: String,
    pub contact_type: ContactType,
    pub location: GeoJsonPoint,
}

impl EmergencyContactDoc {
    pub fn from_domain(contact: &EmergencyContact) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            contact_id: contact.id.clone(),
            name: contact.name.clone(),
            phone: contact.phone.clone(),
            contact_type: contact.contact_type,
            location: GeoPoint::new(contact.lat, contact.lng).into(),
        }
    }

    pub fn into_domain(self) -> EmergencyContact {
        let point = self.location.point();
        EmergencyContact {
            id: self.contact_id,
            name: self.name,
            phone: self.phone,
            contact_type: self.contact_type,
            lat: point.lat,
            lng: point.lng,
        }
    }
}

impl IntoIndexes for EmergencyContactDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "contact_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("contact_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "location": "2dsphere" },
                Some(
                    IndexOptions::builder()
                        .name("location_2dsphere".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for EmergencyContactDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// A user's own contact stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PersonalContactDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub contact_id: String,
    pub user_id: String,
    pub name: String,
    pub phone: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,

    #[serde(default)]
    pub notify_on_emergency: bool,

    /// Absent when the user never shared a location for this contact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoJsonPoint>,
}

impl PersonalContactDoc {
    pub fn from_domain(contact: &PersonalContact) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            contact_id: contact.id.clone(),
            user_id: contact.user_id.clone(),
            name: contact.name.clone(),
            phone: contact.phone.clone(),
            relationship: contact.relationship.clone(),
            notify_on_emergency: contact.notify_on_emergency,
            location: contact.location.map(GeoJsonPoint::from),
        }
    }

    pub fn into_domain(self) -> PersonalContact {
        PersonalContact {
            id: self.contact_id,
            user_id: self.user_id,
            name: self.name,
            phone: self.phone,
            relationship: self.relationship,
            notify_on_emergency: self.notify_on_emergency,
            location: self.location.map(|l| l.point()),
        }
    }
}

impl IntoIndexes for PersonalContactDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "contact_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("contact_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_id_index".to_string())
                        .build(),
                ),
            ),
            // Sparse: contacts without a location are skipped by $geoNear
            (
                doc! { "location": "2dsphere" },
                Some(
                    IndexOptions::builder()
                        .name("location_2dsphere".to_string())
                        .sparse(true)
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PersonalContactDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personal_contact_mapping_keeps_optional_location() {
        let contact = PersonalContact {
            id: "pc1".into(),
            user_id: "u1".into(),
            name: "Mei".into(),
            phone: "13800000000".into(),
            relationship: Some("sister".into()),
            notify_on_emergency: true,
            location: None,
        };

        let doc = PersonalContactDoc::from_domain(&contact);
        let bson = bson::to_document(&doc).unwrap();
        assert!(!bson.contains_key("location"));
        assert_eq!(doc.into_domain(), contact);
    }

    #[test]
    fn test_emergency_contact_mapping() {
        let contact = EmergencyContact {
            id: "ec1".into(),
            name: "Huangpu Police".into(),
            phone: "110".into(),
            contact_type: ContactType::Police,
            lat: 31.23,
            lng: 121.47,
        };
        let doc = EmergencyContactDoc::from_domain(&contact);
        assert_eq!(doc.location.coordinates, [121.47, 31.23]);
        assert_eq!(doc.into_domain(), contact);
    }
}
