//! Static reference data: job categories and countries with their cities.
//!
//! Nothing here is persisted; listings and profiles store the ids.

use serde::Serialize;

use crate::models::Locale;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Category {
    pub id: &'static str,
    pub name_ar: &'static str,
    pub name_en: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct City {
    pub id: &'static str,
    pub name_ar: &'static str,
    pub name_en: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Country {
    pub code: &'static str,
    pub name_ar: &'static str,
    pub name_en: &'static str,
    pub cities: &'static [City],
}

impl Category {
    pub fn name(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Ar => self.name_ar,
            Locale::En => self.name_en,
        }
    }
}

impl City {
    pub fn name(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Ar => self.name_ar,
            Locale::En => self.name_en,
        }
    }
}

impl Country {
    pub fn name(&self, locale: Locale) -> &'static str {
        match locale {
            Locale::Ar => self.name_ar,
            Locale::En => self.name_en,
        }
    }

    /// City by id or by its Arabic or English name.
    pub fn city(&self, key: &str) -> Option<&'static City> {
        let key = key.trim();
        let id = city_key(key);
        self.cities
            .iter()
            .find(|c| c.id == id || c.name_en.eq_ignore_ascii_case(key) || c.name_ar == key)
    }
}

macro_rules! cat {
    ($id:literal, $ar:literal, $en:literal) => {
        Category {
            id: $id,
            name_ar: $ar,
            name_en: $en,
        }
    };
}

macro_rules! city {
    ($id:literal, $ar:literal, $en:literal) => {
        City {
            id: $id,
            name_ar: $ar,
            name_en: $en,
        }
    };
}

pub static CATEGORIES: &[Category] = &[
    cat!("engineering", "هندسة", "Engineering"),
    cat!("software", "برمجة وتقنية معلومات", "Software & IT"),
    cat!("medical", "طب وتمريض", "Medical & Nursing"),
    cat!("education", "تعليم وتدريب", "Education & Training"),
    cat!("sales", "مبيعات", "Sales"),
    cat!("marketing", "تسويق", "Marketing"),
    cat!("accounting", "محاسبة ومالية", "Accounting & Finance"),
    cat!("design", "تصميم", "Design"),
    cat!("construction", "بناء ومقاولات", "Construction"),
    cat!("hospitality", "فنادق ومطاعم", "Hospitality"),
    cat!("driving", "سائقين وتوصيل", "Driving & Delivery"),
    cat!("administration", "إدارة وسكرتارية", "Administration"),
    cat!("customer_service", "خدمة عملاء", "Customer Service"),
    cat!("crafts", "حرف ومهن يدوية", "Crafts & Trades"),
    cat!("other", "أخرى", "Other"),
];

pub static COUNTRIES: &[Country] = &[
    Country {
        code: "SA",
        name_ar: "السعودية",
        name_en: "Saudi Arabia",
        cities: &[
            city!("riyadh", "الرياض", "Riyadh"),
            city!("jeddah", "جدة", "Jeddah"),
            city!("dammam", "الدمام", "Dammam"),
            city!("mecca", "مكة المكرمة", "Mecca"),
            city!("medina", "المدينة المنورة", "Medina"),
        ],
    },
    Country {
        code: "AE",
        name_ar: "الإمارات",
        name_en: "United Arab Emirates",
        cities: &[
            city!("dubai", "دبي", "Dubai"),
            city!("abu_dhabi", "أبوظبي", "Abu Dhabi"),
            city!("sharjah", "الشارقة", "Sharjah"),
        ],
    },
    Country {
        code: "EG",
        name_ar: "مصر",
        name_en: "Egypt",
        cities: &[
            city!("cairo", "القاهرة", "Cairo"),
            city!("alexandria", "الإسكندرية", "Alexandria"),
            city!("giza", "الجيزة", "Giza"),
        ],
    },
    Country {
        code: "JO",
        name_ar: "الأردن",
        name_en: "Jordan",
        cities: &[
            city!("amman", "عمّان", "Amman"),
            city!("irbid", "إربد", "Irbid"),
            city!("zarqa", "الزرقاء", "Zarqa"),
        ],
    },
    Country {
        code: "KW",
        name_ar: "الكويت",
        name_en: "Kuwait",
        cities: &[
            city!("kuwait_city", "مدينة الكويت", "Kuwait City"),
            city!("hawalli", "حولي", "Hawalli"),
        ],
    },
    Country {
        code: "QA",
        name_ar: "قطر",
        name_en: "Qatar",
        cities: &[
            city!("doha", "الدوحة", "Doha"),
            city!("al_rayyan", "الريان", "Al Rayyan"),
        ],
    },
    Country {
        code: "MA",
        name_ar: "المغرب",
        name_en: "Morocco",
        cities: &[
            city!("casablanca", "الدار البيضاء", "Casablanca"),
            city!("rabat", "الرباط", "Rabat"),
            city!("marrakesh", "مراكش", "Marrakesh"),
        ],
    },
];

pub fn category(id: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.id.eq_ignore_ascii_case(id))
}

pub fn country(code: &str) -> Option<&'static Country> {
    COUNTRIES.iter().find(|c| c.code.eq_ignore_ascii_case(code))
}

/// City in any country, for filters that do not name one.
pub fn find_city(key: &str) -> Option<&'static City> {
    COUNTRIES.iter().find_map(|c| c.city(key))
}

// "Abu Dhabi" and "abu-dhabi" both read as `abu_dhabi`.
fn city_key(raw: &str) -> String {
    raw.to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Closest catalog category for a free-text name, if any is close enough.
pub fn suggest_category(name: &str) -> Option<&'static Category> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    CATEGORIES
        .iter()
        .map(|c| {
            let en = strsim::jaro_winkler(&needle, &c.name_en.to_lowercase());
            let ar = strsim::jaro_winkler(&needle, c.name_ar);
            let id = strsim::jaro_winkler(&needle, c.id);
            (c, en.max(ar).max(id))
        })
        .filter(|(_, score)| *score >= 0.85)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c)
}
