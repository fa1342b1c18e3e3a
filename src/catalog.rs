// ♻️ Material Catalog & Transaction Drafts
// What can be weighed, what it is weighed in, and how a candidate weighing
// becomes a Transaction.

use crate::directory::PartyDirectory;
use crate::error::DraftError;
use crate::ledger::Transaction;
use crate::reading::Reading;

// ============================================================================
// CATALOG DATA
// ============================================================================

/// Materials accepted at the scale, grouped by category
pub const MATERIALS_BY_CATEGORY: &[(&str, &[&str])] = &[
    (
        "Metals",
        &[
            "Aluminum",
            "Scrap Metal",
            "Copper",
            "Bronze",
            "Antimony",
            "Steel",
            "Other Metals",
        ],
    ),
    (
        "Paper & Cardboard",
        &[
            "Archive",
            "Cardboard",
            "Trays/Panels",
            "Newspaper",
            "Foldable",
            "Tetra Pack",
            "Plasticized",
            "Kraft",
            "Other Paper/Cardboard",
        ],
    ),
    (
        "Plastics",
        &[
            "Acrylic",
            "Paste",
            "PET",
            "PVC",
            "White Plastic",
            "Polyethylene",
            "Blown Plastic",
            "Polypropylene",
            "Other Plastics",
        ],
    ),
    ("Glass", &["Other Glass"]),
    ("Textile", &["Other Textiles"]),
    ("Wood", &["Other Wood"]),
];

/// Packaging the material may arrive in, with its tare in kg
pub const PACKAGING_TARES: &[(&str, f64)] = &[
    ("None", 0.0),
    ("Burlap Bag", 1.5),
    ("Balloon", 2.5),
    ("Tarp", 2.0),
];

pub fn categories() -> impl Iterator<Item = &'static str> {
    MATERIALS_BY_CATEGORY.iter().map(|(category, _)| *category)
}

/// Materials of a category (empty for unknown categories)
pub fn materials_for(category: &str) -> &'static [&'static str] {
    MATERIALS_BY_CATEGORY
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, materials)| *materials)
        .unwrap_or(&[])
}

/// Tare of a packaging type; unknown packaging weighs nothing
pub fn packaging_tare(packaging: &str) -> f64 {
    PACKAGING_TARES
        .iter()
        .find(|(name, _)| *name == packaging)
        .map(|(_, tare)| *tare)
        .unwrap_or(0.0)
}

// ============================================================================
// DRAFT
// ============================================================================

/// TransactionDraft - the operator's selections before a weighing is saved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionDraft {
    pub party_name: String,
    pub category: String,
    pub material: String,
    pub packaging: String,
}

impl TransactionDraft {
    /// Combine the selections with a scale reading.
    ///
    /// Party and material names are stored uppercase; the party ID comes
    /// from the directory; net = gross - packaging tare. A non-positive net
    /// weight is not rejected here, see `Transaction::needs_confirmation`.
    pub fn finalize(
        &self,
        reading: &Reading,
        directory: &PartyDirectory,
    ) -> Result<Transaction, DraftError> {
        if !reading.has_timestamp() {
            return Err(DraftError::MissingPeriod);
        }

        let party_name = self.party_name.trim();
        let category = self.category.trim();
        let material = self.material.trim();
        for (value, field) in [(party_name, "party"), (category, "category"), (material, "material")] {
            if value.is_empty() {
                return Err(DraftError::MissingField(field));
            }
        }

        let materials = materials_for(category);
        if materials.is_empty() {
            return Err(DraftError::UnknownCategory(category.to_string()));
        }
        if !materials.iter().any(|m| m.eq_ignore_ascii_case(material)) {
            return Err(DraftError::MaterialNotInCategory {
                category: category.to_string(),
                material: material.to_string(),
            });
        }

        let tare = packaging_tare(self.packaging.trim());

        Ok(Transaction {
            period: reading.timestamp.clone(),
            party_name: party_name.to_uppercase(),
            party_id: directory.resolve(party_name).to_string(),
            category: category.to_string(),
            material_name: material.to_uppercase(),
            packaging_tare: tare,
            gross_weight: reading.gross_weight,
            net_weight: reading.gross_weight - tare,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{PartyRecord, UNKNOWN_ID};

    fn directory() -> PartyDirectory {
        vec![PartyRecord {
            name: "Acme Recycling".to_string(),
            id: "900".to_string(),
        }]
        .into_iter()
        .collect()
    }

    fn reading(timestamp: &str, gross: f64) -> Reading {
        Reading {
            timestamp: timestamp.to_string(),
            gross_weight: gross,
        }
    }

    fn draft(party: &str, category: &str, material: &str, packaging: &str) -> TransactionDraft {
        TransactionDraft {
            party_name: party.to_string(),
            category: category.to_string(),
            material: material.to_string(),
            packaging: packaging.to_string(),
        }
    }

    #[test]
    fn test_catalog_lookups() {
        assert_eq!(categories().count(), 6);
        assert!(materials_for("Plastics").contains(&"PET"));
        assert!(materials_for("Ceramics").is_empty());
        assert_eq!(packaging_tare("Burlap Bag"), 1.5);
        assert_eq!(packaging_tare("Crate"), 0.0);
    }

    #[test]
    fn test_finalize_computes_net_and_resolves_party() {
        let tx = draft("Acme Recycling", "Plastics", "Pet", "Tarp")
            .finalize(&reading("01/03/2025", 12.4), &directory())
            .unwrap();

        assert_eq!(tx.period, "01/03/2025");
        assert_eq!(tx.party_name, "ACME RECYCLING");
        assert_eq!(tx.party_id, "900");
        assert_eq!(tx.material_name, "PET");
        assert_eq!(tx.packaging_tare, 2.0);
        assert_eq!(tx.gross_weight, 12.4);
        assert!((tx.net_weight - 10.4).abs() < 1e-9);
        assert!(!tx.needs_confirmation());
    }

    #[test]
    fn test_finalize_unknown_party_gets_unknown_id() {
        let tx = draft("Walk-in", "Glass", "Other Glass", "None")
            .finalize(&reading("01/03/2025", 3.0), &directory())
            .unwrap();

        assert_eq!(tx.party_id, UNKNOWN_ID);
    }

    #[test]
    fn test_finalize_requires_scale_date() {
        let result = draft("Acme Recycling", "Plastics", "PET", "None")
            .finalize(&reading("", 5.0), &directory());

        assert_eq!(result, Err(DraftError::MissingPeriod));
    }

    #[test]
    fn test_finalize_rejects_incomplete_or_mismatched() {
        let dir = directory();
        let r = reading("01/03/2025", 5.0);

        assert_eq!(
            draft("", "Plastics", "PET", "None").finalize(&r, &dir),
            Err(DraftError::MissingField("party"))
        );
        assert_eq!(
            draft("Acme Recycling", "Plastics", " ", "None").finalize(&r, &dir),
            Err(DraftError::MissingField("material"))
        );
        assert_eq!(
            draft("Acme Recycling", "Ceramics", "Tile", "None").finalize(&r, &dir),
            Err(DraftError::UnknownCategory("Ceramics".to_string()))
        );
        assert!(matches!(
            draft("Acme Recycling", "Metals", "PET", "None").finalize(&r, &dir),
            Err(DraftError::MaterialNotInCategory { .. })
        ));
    }

    #[test]
    fn test_heavy_packaging_needs_confirmation() {
        let tx = draft("Acme Recycling", "Wood", "Other Wood", "Balloon")
            .finalize(&reading("01/03/2025", 2.0), &directory())
            .unwrap();

        assert!(tx.net_weight < 0.0);
        assert!(tx.needs_confirmation());
    }
}
