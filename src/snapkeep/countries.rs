use std::sync::RwLock;

use serde::Serialize;

/// Country metadata used by the message-view feature to compose phone
/// numbers. A static lookup table behind an interface; nothing here is
/// fetched or persisted by this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Country {
    pub name: &'static str,
    /// ISO 3166-1 alpha-2 code.
    pub code: &'static str,
    pub dial_code: u16,
}

pub trait CountryProvider: Send + Sync {
    fn all_countries(&self) -> Vec<Country>;

    fn default_country(&self) -> Country;

    fn set_default_country(&self, code: &str);
}

const FALLBACK_CODE: &str = "US";

static COUNTRIES: &[Country] = &[
    Country { name: "Argentina", code: "AR", dial_code: 54 },
    Country { name: "Australia", code: "AU", dial_code: 61 },
    Country { name: "Brazil", code: "BR", dial_code: 55 },
    Country { name: "Canada", code: "CA", dial_code: 1 },
    Country { name: "Colombia", code: "CO", dial_code: 57 },
    Country { name: "Egypt", code: "EG", dial_code: 20 },
    Country { name: "France", code: "FR", dial_code: 33 },
    Country { name: "Germany", code: "DE", dial_code: 49 },
    Country { name: "India", code: "IN", dial_code: 91 },
    Country { name: "Indonesia", code: "ID", dial_code: 62 },
    Country { name: "Italy", code: "IT", dial_code: 39 },
    Country { name: "Kenya", code: "KE", dial_code: 254 },
    Country { name: "Mexico", code: "MX", dial_code: 52 },
    Country { name: "Nigeria", code: "NG", dial_code: 234 },
    Country { name: "Pakistan", code: "PK", dial_code: 92 },
    Country { name: "Peru", code: "PE", dial_code: 51 },
    Country { name: "Philippines", code: "PH", dial_code: 63 },
    Country { name: "Saudi Arabia", code: "SA", dial_code: 966 },
    Country { name: "South Africa", code: "ZA", dial_code: 27 },
    Country { name: "Spain", code: "ES", dial_code: 34 },
    Country { name: "Turkey", code: "TR", dial_code: 90 },
    Country { name: "United Arab Emirates", code: "AE", dial_code: 971 },
    Country { name: "United Kingdom", code: "GB", dial_code: 44 },
    Country { name: "United States", code: "US", dial_code: 1 },
    Country { name: "Venezuela", code: "VE", dial_code: 58 },
];

/// Built-in [`CountryProvider`] backed by the static table. The selected
/// default lives in memory only; durable storage of the selection belongs to
/// the embedder's preference layer.
pub struct StaticCountries {
    selected: RwLock<Option<String>>,
}

impl StaticCountries {
    pub fn new() -> Self {
        Self {
            selected: RwLock::new(None),
        }
    }

    /// Restores a previously persisted selection, typically at startup.
    pub fn with_selected(code: &str) -> Self {
        let provider = Self::new();
        provider.set_default_country(code);
        provider
    }

    fn find(code: &str) -> Option<Country> {
        COUNTRIES
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
            .cloned()
    }
}

impl Default for StaticCountries {
    fn default() -> Self {
        Self::new()
    }
}

impl CountryProvider for StaticCountries {
    fn all_countries(&self) -> Vec<Country> {
        COUNTRIES.to_vec()
    }

    fn default_country(&self) -> Country {
        let selected = self.selected.read().expect("countries lock poisoned");
        selected
            .as_deref()
            .and_then(Self::find)
            .or_else(|| Self::find(FALLBACK_CODE))
            .expect("fallback country missing from table")
    }

    fn set_default_country(&self, code: &str) {
        if Self::find(code).is_none() {
            tracing::warn!(
                target: "snapkeep::countries",
                "Ignoring unknown country code: {}",
                code
            );
            return;
        }
        let mut selected = self.selected.write().expect("countries lock poisoned");
        *selected = Some(code.to_ascii_uppercase());
    }
}
