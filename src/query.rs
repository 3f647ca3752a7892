use rusqlite::params_from_iter;
use rusqlite::types::Value;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog;
use crate::db::{Database, LISTING_COLUMNS};
use crate::error::Result;
use crate::models::{Listing, PostType, WorkType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    MostLiked,
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            "most_liked" | "popular" => Ok(SortOrder::MostLiked),
            other => Err(format!("unknown sort '{other}' (newest, oldest, most_liked)")),
        }
    }
}

/// Filters picked in the browse view. Every set field narrows the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingQuery {
    pub post_type: Option<PostType>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub category_id: Option<String>,
    pub work_type: Option<WorkType>,
    pub text: Option<String>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl ListingQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_type(mut self, post_type: PostType) -> Self {
        self.post_type = Some(post_type);
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn work_type(mut self, work_type: WorkType) -> Self {
        self.work_type = Some(work_type);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn needle(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }

    /// SQL and bound values for the equality part of the query.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE 1=1");
        let mut params: Vec<Value> = Vec::new();

        let mut push = |column: &str, value: String| {
            params.push(Value::Text(value));
            sql.push_str(&format!(" AND {column} = ?{}", params.len()));
        };

        if let Some(post_type) = self.post_type {
            push("post_type", post_type.as_str().to_string());
        }
        if let Some(country) = self.country.as_deref() {
            push("country", country.trim().to_uppercase());
        }
        if let Some(city) = self.city.as_deref() {
            let known = self
                .country
                .as_deref()
                .and_then(|code| catalog::country(code.trim()))
                .and_then(|country| country.city(city))
                .or_else(|| catalog::find_city(city));
            match known {
                Some(found) => push("city", found.id.to_string()),
                None => push("city", city.trim().to_lowercase()),
            }
        }
        if let Some(category) = self.category_id.as_deref() {
            push("category_id", category.trim().to_lowercase());
        }
        if let Some(work_type) = self.work_type {
            push("work_type", work_type.as_str().to_string());
        }

        sql.push_str(match self.sort {
            SortOrder::Newest => " ORDER BY created_at DESC, id DESC",
            SortOrder::Oldest => " ORDER BY created_at ASC, id ASC",
            SortOrder::MostLiked => " ORDER BY like_count DESC, created_at DESC, id DESC",
        });

        // With a text filter the limit has to wait until after matching.
        if let (Some(limit), None) = (self.limit, self.needle()) {
            params.push(Value::Integer(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        (sql, params)
    }

    /// Run the query, propagating storage errors.
    pub fn try_execute(&self, db: &Database) -> Result<Vec<Listing>> {
        let (sql, params) = self.to_sql();
        debug!(%sql, "Listing query");

        let mut stmt = db.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), Database::row_to_listing)?;
        let listings = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(match self.needle() {
            Some(needle) => {
                let mut matched: Vec<Listing> =
                    listings.into_iter().filter(|l| matches_text(l, &needle)).collect();
                if let Some(limit) = self.limit {
                    matched.truncate(limit);
                }
                matched
            }
            None => listings,
        })
    }

    /// Run the query. A storage failure is logged and yields no results.
    pub fn execute(&self, db: &Database) -> Vec<Listing> {
        self.try_execute(db).unwrap_or_else(|e| {
            warn!(error = %e, query = ?self, "Listing query failed, returning no results");
            Vec::new()
        })
    }
}

/// Case-insensitive substring match on title or description.
/// `needle` must already be lowercased.
pub fn matches_text(listing: &Listing, needle: &str) -> bool {
    listing.title.to_lowercase().contains(needle)
        || listing.description.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;
    use crate::models::ListingDraft;

    fn seed(db: &mut Database) -> Vec<Listing> {
        let owner = user(db, "owner@x.io");
        let mut drafts = Vec::new();

        drafts.push(draft("Rust Backend Engineer"));

        let mut d = draft("مطلوب محاسب");
        d.post_type = Some(PostType::SeekingWorker);
        d.category_id = Some("accounting".to_string());
        d.country = "EG".to_string();
        d.city = Some("cairo".to_string());
        drafts.push(d);

        let mut d = draft("Remote designer available");
        d.post_type = Some(PostType::SeekingJob);
        d.category_id = Some("design".to_string());
        d.work_type = Some(WorkType::Remote);
        d.description = "Portfolio includes RUST conference branding".to_string();
        drafts.push(d);

        let mut d = draft("Part-time driver");
        d.work_type = Some(WorkType::PartTime);
        d.city = Some("jeddah".to_string());
        drafts.push(d);

        drafts.iter().map(|d: &ListingDraft| listing(db, owner, d)).collect()
    }

    fn titles(listings: &[Listing]) -> Vec<&str> {
        listings.iter().map(|l| l.title.as_str()).collect()
    }

    #[test]
    fn no_filters_returns_everything_newest_first() {
        let mut db = db();
        let seeded = seed(&mut db);
        let all = ListingQuery::new().execute(&db);
        assert_eq!(all.len(), seeded.len());
        // Same-millisecond inserts fall back to id order.
        assert_eq!(all[0].id, seeded.last().unwrap().id);
        let oldest = ListingQuery::new().sort(SortOrder::Oldest).execute(&db);
        assert_eq!(oldest[0].id, seeded[0].id);
    }

    #[test]
    fn city_filter_accepts_names() {
        let mut db = db();
        seed(&mut db);
        let owner = user(&db, "ae@x.io");
        let mut d = draft("Hotel receptionist");
        d.country = "AE".to_string();
        d.city = Some("Abu Dhabi".to_string());
        let stored = listing(&mut db, owner, &d);
        assert_eq!(stored.city.as_deref(), Some("abu_dhabi"));

        let found = ListingQuery::new().city("الرياض").execute(&db);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|l| l.city.as_deref() == Some("riyadh")));

        let found = ListingQuery::new().country("AE").city("abu-dhabi").execute(&db);
        assert_eq!(titles(&found), vec!["Hotel receptionist"]);
        let found = ListingQuery::new().city("Abu Dhabi").execute(&db);
        assert_eq!(titles(&found), vec!["Hotel receptionist"]);

        assert!(ListingQuery::new().city("Atlantis").execute(&db).is_empty());
    }

    #[test]
    fn equality_filters_are_conjunctive() {
        let mut db = db();
        seed(&mut db);

        let query = ListingQuery::new()
            .post_type(PostType::SeekingWorker)
            .country("sa")
            .city("Riyadh");
        let found = query.execute(&db);
        assert_eq!(titles(&found), vec!["Rust Backend Engineer"]);
        for listing in &found {
            assert_eq!(listing.post_type, PostType::SeekingWorker);
            assert_eq!(listing.country, "SA");
            assert_eq!(listing.city.as_deref(), Some("riyadh"));
        }

        let found = ListingQuery::new().category("ACCOUNTING").execute(&db);
        assert_eq!(titles(&found), vec!["مطلوب محاسب"]);

        let found = ListingQuery::new()
            .work_type(WorkType::PartTime)
            .post_type(PostType::SeekingJob)
            .execute(&db);
        assert!(found.is_empty());
    }

    #[test]
    fn text_search_matches_title_or_description_case_insensitively() {
        let mut db = db();
        seed(&mut db);

        let found = ListingQuery::new().text("rust").execute(&db);
        assert_eq!(
            titles(&found),
            vec!["Remote designer available", "Rust Backend Engineer"]
        );

        let found = ListingQuery::new().text("محاسب").execute(&db);
        assert_eq!(titles(&found), vec!["مطلوب محاسب"]);
    }

    #[test]
    fn text_search_never_readmits_filtered_rows() {
        let mut db = db();
        seed(&mut db);

        let found = ListingQuery::new()
            .post_type(PostType::SeekingJob)
            .text("RUST")
            .execute(&db);
        assert_eq!(titles(&found), vec!["Remote designer available"]);
    }

    #[test]
    fn limit_applies_after_text_filter() {
        let mut db = db();
        seed(&mut db);

        let (sql, _) = ListingQuery::new().limit(1).to_sql();
        assert!(sql.ends_with("LIMIT ?1"));

        // Newest rows do not match; a server-side LIMIT 1 would return nothing.
        let found = ListingQuery::new().text("engineer").limit(1).execute(&db);
        assert_eq!(titles(&found), vec!["Rust Backend Engineer"]);

        let found = ListingQuery::new().limit(2).execute(&db);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn blank_text_is_ignored() {
        let mut db = db();
        seed(&mut db);
        assert_eq!(ListingQuery::new().text("   ").execute(&db).len(), 4);
    }

    #[test]
    fn storage_failure_yields_empty_list() {
        let db = Database::open_in_memory().unwrap(); // no schema
        assert!(ListingQuery::new().try_execute(&db).is_err());
        assert!(ListingQuery::new().execute(&db).is_empty());
    }

    #[test]
    fn parses_sort_names() {
        assert_eq!("most-liked".parse::<SortOrder>().unwrap(), SortOrder::MostLiked);
        assert!("random".parse::<SortOrder>().is_err());
    }
}
