use std::fmt::Write as _;

use crate::db::Database;
use crate::error::Result;

/// Pages that exist regardless of content.
const STATIC_PAGES: &[(&str, &str, &str)] = &[
    ("", "daily", "1.0"),
    ("/jobs", "hourly", "0.9"),
    ("/post", "monthly", "0.5"),
    ("/about", "yearly", "0.3"),
];

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn sitemap_xml(site_url: &str, listings: &[(String, String)]) -> String {
    let base = site_url.trim_end_matches('/');
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );

    for (path, changefreq, priority) in STATIC_PAGES {
        let _ = write!(
            xml,
            "  <url>\n    <loc>{}</loc>\n    <changefreq>{changefreq}</changefreq>\n    <priority>{priority}</priority>\n  </url>\n",
            escape(&format!("{base}{path}"))
        );
    }

    for (slug, updated_at) in listings {
        let lastmod = updated_at.get(..10).unwrap_or(updated_at);
        let _ = write!(
            xml,
            "  <url>\n    <loc>{}</loc>\n    <lastmod>{}</lastmod>\n    <changefreq>weekly</changefreq>\n    <priority>0.7</priority>\n  </url>\n",
            // Arabic slugs end up UTF-8 percent-encoded.
            escape(&format!("{base}/jobs/{}", urlencoding::encode(slug))),
            escape(lastmod)
        );
    }

    xml.push_str("</urlset>\n");
    xml
}

pub fn robots_txt(site_url: &str) -> String {
    format!(
        "User-agent: *\nAllow: /\nDisallow: /post\nDisallow: /profile\n\nSitemap: {}/sitemap.xml\n",
        site_url.trim_end_matches('/')
    )
}

/// Sitemap for everything currently in the store.
pub fn generate(db: &Database, site_url: &str) -> Result<String> {
    Ok(sitemap_xml(site_url, &db.listing_slugs()?))
}
