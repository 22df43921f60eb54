// Mock car listing generation and CSV export.

use std::io::Write;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DashboardConfig, ListingRanges};

pub const CSV_HEADER: [&str; 5] = ["make", "model", "year", "price", "location"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub make: String,
    pub model: String,
    pub year: u16,
    pub price: u32,
    pub location: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("count must be a positive integer, got {0}")]
    InvalidCount(usize),

    #[error("catalog has no makes with models to draw from")]
    EmptyCatalog,

    #[error("no locations configured")]
    NoLocations,

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Draws listings uniformly from the configured catalog and ranges.
#[derive(Debug, Clone)]
pub struct ListingGenerator {
    ranges: ListingRanges,
    makes: Vec<(String, Vec<String>)>,
    locations: Vec<String>,
}

impl ListingGenerator {
    pub fn new(config: &DashboardConfig) -> Result<Self, ListingError> {
        let makes: Vec<(String, Vec<String>)> = config
            .catalog
            .iter()
            .filter(|(_, models)| !models.is_empty())
            .map(|(make, models)| (make.clone(), models.clone()))
            .collect();
        if makes.is_empty() {
            return Err(ListingError::EmptyCatalog);
        }
        if config.locations.is_empty() {
            return Err(ListingError::NoLocations);
        }
        Ok(Self {
            ranges: config.listings,
            makes,
            locations: config.locations.clone(),
        })
    }

    pub fn ranges(&self) -> &ListingRanges {
        &self.ranges
    }

    pub fn generate_listing<R: Rng>(&self, rng: &mut R) -> Listing {
        let (make, models) = &self.makes[rng.random_range(0..self.makes.len())];
        let model = &models[rng.random_range(0..models.len())];
        let listing = Listing {
            make: make.clone(),
            model: model.clone(),
            year: rng.random_range(self.ranges.min_year..=self.ranges.max_year),
            price: rng.random_range(self.ranges.min_price..=self.ranges.max_price),
            location: self.locations[rng.random_range(0..self.locations.len())].clone(),
        };
        debug!(?listing, "generated listing");
        listing
    }

    /// Generate exactly `count` listings. A count of zero is rejected.
    pub fn generate_listings<R: Rng>(
        &self,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<Listing>, ListingError> {
        if count < 1 {
            return Err(ListingError::InvalidCount(count));
        }
        let listings: Vec<Listing> = (0..count).map(|_| self.generate_listing(rng)).collect();
        info!("Generated {} listings", listings.len());
        Ok(listings)
    }
}

/// Write listings as CSV with a header row (written even when empty).
pub fn write_csv<W: Write>(listings: &[Listing], writer: W) -> Result<(), ListingError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for listing in listings {
        wtr.serialize(listing)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
