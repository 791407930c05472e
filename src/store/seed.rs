use tracing::info;

use super::Store;
use crate::error::StoreResult;
use crate::models::{AddressInput, CardInput, EmailInput, PhoneInput};

struct Sample {
    name: &'static str,
    title: &'static str,
    company: &'static str,
    website: &'static str,
    phones: &'static [(&'static str, &'static str)],
    emails: &'static [(&'static str, &'static str)],
    // (label, street, city, country, postal)
    addresses: &'static [(&'static str, &'static str, &'static str, &'static str, &'static str)],
    tags: &'static [&'static str],
}

const SAMPLES: &[Sample] = &[
    Sample {
        name: "Mei Ling Ong",
        title: "Head of Payments",
        company: "Harbourline Bank",
        website: "https://harbourline.example",
        phones: &[("mobile", "+65 9001 2233"), ("work", "+65 6100 4000")],
        emails: &[("work", "meiling.ong@harbourline.example")],
        addresses: &[("office", "8 Marina View", "Singapore", "Singapore", "018960")],
        tags: &["fintech", "client"],
    },
    Sample {
        name: "Arjun Menon",
        title: "Staff Engineer",
        company: "Ridewell",
        website: "https://ridewell.example",
        phones: &[("mobile", "+65 8123 0099")],
        emails: &[("work", "arjun@ridewell.example"), ("personal", "arjun.menon@mail.example")],
        addresses: &[],
        tags: &["colleague"],
    },
    Sample {
        name: "Nur Aisyah Karim",
        title: "Deputy Director",
        company: "Digital Services Agency",
        website: "https://dsa.example.gov",
        phones: &[("work", "+65 6200 1100")],
        emails: &[("work", "nur_aisyah@dsa.example.gov")],
        addresses: &[("office", "10 Pasir Panjang Road", "Singapore", "Singapore", "117438")],
        tags: &["government", "partner"],
    },
    Sample {
        name: "Daniel Lim",
        title: "General Partner",
        company: "Causeway Ventures",
        website: "https://causeway.example",
        phones: &[("mobile", "+60 12-555 0142")],
        emails: &[("work", "daniel@causeway.example")],
        addresses: &[("office", "Level 20 Menara Utama", "Kuala Lumpur", "Malaysia", "50088")],
        tags: &["investor", "fintech"],
    },
    Sample {
        name: "Putri Wulandari",
        title: "Procurement Lead",
        company: "Nusantara Logistics",
        website: "https://nusantara-log.example",
        phones: &[("mobile", "+62 811-2000-314"), ("fax", "+62 21-500-0315")],
        emails: &[("work", "putri.w@nusantara-log.example")],
        addresses: &[("office", "Jalan Gatot Subroto 42", "Jakarta", "Indonesia", "12950")],
        tags: &["vendor"],
    },
    Sample {
        name: "Somchai Prasert",
        title: "Product Manager",
        company: "Chao Phraya Travel",
        website: "https://cptravel.example",
        phones: &[("mobile", "+66 81-000-2468")],
        emails: &[("work", "somchai@cptravel.example")],
        addresses: &[("home", "", "Bangkok", "Thailand", "10330")],
        tags: &["colleague", "partner"],
    },
];

impl Sample {
    fn to_input(&self) -> CardInput {
        CardInput {
            name: self.name.to_string(),
            title: self.title.to_string(),
            company: self.company.to_string(),
            website: self.website.to_string(),
            notes: String::new(),
            phones: self
                .phones
                .iter()
                .map(|(label, number)| PhoneInput {
                    label: label.to_string(),
                    number: number.to_string(),
                })
                .collect(),
            emails: self
                .emails
                .iter()
                .map(|(label, address)| EmailInput {
                    label: label.to_string(),
                    address: address.to_string(),
                })
                .collect(),
            addresses: self
                .addresses
                .iter()
                .map(|(label, street, city, country, postal)| AddressInput {
                    label: label.to_string(),
                    street: street.to_string(),
                    city: city.to_string(),
                    country: country.to_string(),
                    postal: postal.to_string(),
                })
                .collect(),
            tags: self.tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Store {
    /// Inserts the sample cards through the regular create path.
    /// Does nothing unless the database has no cards yet.
    pub fn seed_if_empty(&self) -> StoreResult<usize> {
        if !self.is_empty()? {
            return Ok(0);
        }
        for sample in SAMPLES {
            self.create(&sample.to_input())?;
        }
        info!(count = SAMPLES.len(), "seeded sample cards");
        Ok(SAMPLES.len())
    }
}
