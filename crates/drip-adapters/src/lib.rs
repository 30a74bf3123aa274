//! Per-roaster extraction adapters.
//!
//! Every adapter is a pure text-extraction capability: listing HTML in,
//! products out; detail HTML in, optional metadata fields out. Listing
//! parsing is selector-driven and shared; detail parsing is per-roaster
//! label/regex matching over the page text. Adapters never fail: a page
//! that matches nothing yields an empty list or empty fields.

use std::collections::HashSet;

use regex::RegexBuilder;
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub use drip_core::Product;

pub const CRATE_NAME: &str = "drip-adapters";

mod roasters;

pub use roasters::{adapter_for, all_adapters};

/// CSS selector set for one roaster's listing page.
#[derive(Debug, Clone, Copy)]
pub struct ListingSelectors {
    pub product: &'static str,
    pub title: &'static str,
    pub link: &'static str,
    pub price: Option<&'static str>,
    pub sold_out: Option<&'static str>,
}

/// Optional metadata extracted from a product detail page. Absent fields
/// stay empty; extraction failure is not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub producer: String,
    pub country: String,
    pub region: String,
    pub process: String,
    pub variety: String,
    pub notes: String,
    pub profile: String,
    pub image: String,
}

impl DetailFields {
    /// Copy the extracted fields onto a product. The listing-time image is
    /// kept when the detail page had none.
    pub fn apply_to(&self, product: &mut Product) {
        product.producer = self.producer.clone();
        product.country = self.country.clone();
        product.region = self.region.clone();
        product.process = self.process.clone();
        product.variety = self.variety.clone();
        product.notes = self.notes.clone();
        product.profile = self.profile.clone();
        if !self.image.is_empty() {
            product.image = self.image.clone();
        }
    }
}

/// One monitored roaster: where its listing lives and how to read its pages.
pub trait RoasterAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn listing_url(&self) -> &'static str;
    fn parse_listing(&self, html: &str) -> Vec<Product>;
    fn parse_details(&self, html: &str) -> DetailFields;
}

/// Collapse whitespace runs into single spaces and trim.
pub fn normalize_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn absolutize(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    Url::parse(base_url)
        .ok()
        .and_then(|base| base.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

fn select_one<'a>(node: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    node.select(&sel).next()
}

fn element_text(node: ElementRef<'_>) -> String {
    normalize_space(&node.text().collect::<Vec<_>>().join(" "))
}

fn image_from_node(node: ElementRef<'_>) -> String {
    let Some(img) = select_one(node, "img") else {
        return String::new();
    };
    let attrs = img.value();
    if let Some(src) = attrs.attr("src").or_else(|| attrs.attr("data-src")) {
        return src.to_string();
    }
    attrs
        .attr("data-srcset")
        .and_then(|srcset| srcset.split(' ').next())
        .unwrap_or_default()
        .to_string()
}

fn is_sold_out(node: ElementRef<'_>, selectors: &ListingSelectors) -> bool {
    let sold_out_re = RegexBuilder::new(r"sold\s*out")
        .case_insensitive(true)
        .build()
        .expect("static regex");
    if let Some(sel) = selectors.sold_out {
        if let Some(el) = select_one(node, sel) {
            if sold_out_re.is_match(&element_text(el)) {
                return true;
            }
        }
    }
    // Fallback: some themes only mention "Sold out" in loose card text.
    sold_out_re.is_match(&element_text(node))
}

/// Shared listing parser: walk the product nodes, pull title/link/price/
/// stock/image, dedup by URL in document order. When the selectors match
/// nothing, fall back to collecting every `/products/` anchor on the page.
pub fn parse_listing_with(
    roaster: &str,
    listing_url: &str,
    selectors: &ListingSelectors,
    html: &str,
) -> Vec<Product> {
    let document = Html::parse_document(html);
    let mut out = Vec::new();
    let mut seen_urls = HashSet::new();

    if let Ok(product_sel) = Selector::parse(selectors.product) {
        for node in document.select(&product_sel) {
            let Some(link) = select_one(node, selectors.link) else {
                continue;
            };
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let url = absolutize(listing_url, href);
            if !seen_urls.insert(url.clone()) {
                continue;
            }

            let title_el = select_one(node, selectors.title).unwrap_or(link);
            let mut product = Product::new(roaster, element_text(title_el), url);
            if let Some(price_sel) = selectors.price {
                if let Some(el) = select_one(node, price_sel) {
                    product.price_text = element_text(el);
                }
            }
            product.in_stock = !is_sold_out(node, selectors);
            product.image = image_from_node(node);
            out.push(product);
        }
    }

    if out.is_empty() {
        if let Ok(anchor_sel) = Selector::parse("a[href*='/products/']") {
            for anchor in document.select(&anchor_sel) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                let url = absolutize(listing_url, href);
                if !seen_urls.insert(url.clone()) {
                    continue;
                }
                let title = match element_text(anchor) {
                    t if t.is_empty() => "(untitled)".to_string(),
                    t => t,
                };
                out.push(Product::new(roaster, title, url));
            }
        }
    }

    out
}

/// Flatten a document into one text node per line, the shape the detail
/// label patterns match against.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First capture group of `pattern` in `text`, trimmed.
pub fn capture1(text: &str, pattern: &str, case_insensitive: bool) -> Option<String> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Derive a country from a region string like "Santa Maria, Huila, Colombia"
/// (country is the last comma-separated component).
pub fn country_from_region(region: &str) -> Option<String> {
    let mut parts = region.rsplit(',');
    let last = parts.next()?.trim();
    if parts.next().is_some() && !last.is_empty() {
        Some(last.to_string())
    } else {
        None
    }
}

/// Product image fallback shared by every detail parser: the `og:image`
/// meta tag, else the first `img` on the page.
pub fn page_image(html: &str) -> String {
    let document = Html::parse_document(html);
    if let Ok(sel) = Selector::parse("meta[property='og:image']") {
        if let Some(meta) = document.select(&sel).next() {
            if let Some(content) = meta.value().attr("content") {
                return content.to_string();
            }
        }
    }
    if let Ok(sel) = Selector::parse("img") {
        if let Some(img) = document.select(&sel).next() {
            if let Some(src) = img.value().attr("src").or_else(|| img.value().attr("data-src")) {
                return src.to_string();
            }
        }
    }
    String::new()
}

/// Meta description content, used by roasters that put tasting notes there.
pub fn meta_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let sel = Selector::parse("meta[name='description']").ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

/// Extract `Label: value` fields common to several Shopify themes.
pub fn colon_labeled_details(text: &str) -> DetailFields {
    let mut details = DetailFields::default();
    if let Some(notes) = capture1(text, r"Tasting Notes:\s*([^\n]+)", false) {
        details.notes = notes;
    }
    if let Some(region) = capture1(text, r"Region:\s*([^\n]+)", false) {
        if let Some(country) = country_from_region(&region) {
            details.country = country;
        }
        details.region = region;
    }
    if let Some(producer) = capture1(text, r"Producer:\s*([^\n]+)", false) {
        details.producer = producer;
    }
    if let Some(process) = capture1(text, r"Process:\s*([^\n]+)", false) {
        details.process = process;
    }
    if let Some(variety) = capture1(text, r"Variety:\s*([^\n]+)", false) {
        details.variety = variety;
    }
    details
}

/// Extract `Label | value` fields plus a "TAKE A SIP" notes banner, the
/// layout Black & White and Brandywine share.
pub fn pipe_labeled_details(text: &str) -> DetailFields {
    let mut details = DetailFields::default();
    details.notes = capture1(text, r"TAKE\s+A\s+SIP\s*\|\s*(.*?)\n", true)
        .or_else(|| capture1(text, r"notes of ([^.\n]+)", true))
        .unwrap_or_default();
    if let Some(producer) = capture1(text, r"Producer\s*\|\s*([^\n]+)", false) {
        details.producer = producer;
    }
    if let Some(process) = capture1(text, r"Process\s*\|\s*([^\n]+)", false) {
        details.process = process;
    }
    if let Some(variety) = capture1(text, r"Variety\s*\|\s*([^\n]+)", false) {
        details.variety = variety;
    }
    if let Some(origin) = capture1(text, r"Origin\s*\|\s*([^\n]+)", false) {
        if let Some(country) = country_from_region(&origin) {
            details.country = country;
        }
        details.region = origin;
    }
    details
}

// Used by adapter tests so a selector typo fails loudly instead of
// silently matching nothing.
#[doc(hidden)]
pub fn selector_parses(selector: &str) -> bool {
    Selector::parse(selector).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
      <ul>
        <li class="grid__item">
          <a class="product-link" href="/products/kiamugumo">Kiamugumo</a>
          <span class="price-item">$24.00</span>
          <img src="https://cdn.test/kiamugumo.jpg">
        </li>
        <li class="grid__item">
          <a class="product-link" href="/products/el-vergel">El Vergel</a>
          <span class="price-item">$19.00</span>
          <span class="badge--sold-out">Sold out</span>
        </li>
        <li class="grid__item">
          <a class="product-link" href="/products/kiamugumo">Kiamugumo duplicate card</a>
        </li>
      </ul>
    "#;

    const SELECTORS: ListingSelectors = ListingSelectors {
        product: "li.grid__item",
        title: "a.product-link",
        link: "a.product-link",
        price: Some("span.price-item"),
        sold_out: Some("span.badge--sold-out"),
    };

    #[test]
    fn listing_parses_products_with_price_stock_and_image() {
        let items = parse_listing_with("Acme", "https://acme.test/collections/all", &SELECTORS, LISTING);
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].title, "Kiamugumo");
        assert_eq!(items[0].url, "https://acme.test/products/kiamugumo");
        assert_eq!(items[0].price_text, "$24.00");
        assert!(items[0].in_stock);
        assert_eq!(items[0].image, "https://cdn.test/kiamugumo.jpg");

        assert_eq!(items[1].title, "El Vergel");
        assert!(!items[1].in_stock);
    }

    #[test]
    fn listing_falls_back_to_product_anchors() {
        let html = r#"
          <div>
            <a href="/products/gesha-village">Gesha Village</a>
            <a href="https://acme.test/products/gesha-village">Gesha Village again</a>
            <a href="/pages/about">About</a>
          </div>
        "#;
        let items = parse_listing_with("Acme", "https://acme.test/", &SELECTORS, html);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://acme.test/products/gesha-village");
        assert!(items[0].in_stock);
        assert!(items[0].price_text.is_empty());
    }

    #[test]
    fn loose_sold_out_text_flips_stock() {
        let html = r#"
          <li class="grid__item">
            <a class="product-link" href="/products/x">X</a>
            <p>Sold Out</p>
          </li>
        "#;
        let items = parse_listing_with("Acme", "https://acme.test/", &SELECTORS, html);
        assert!(!items[0].in_stock);
    }

    #[test]
    fn colon_labels_extract_across_element_boundaries() {
        let html = r#"
          <div><strong>Tasting Notes:</strong> jasmine, bergamot, honey</div>
          <div><strong>Region:</strong> Gedeb, Gedeo, Ethiopia</div>
          <div><strong>Producer:</strong> Worka Cooperative</div>
          <div><strong>Process:</strong> Washed</div>
          <div><strong>Variety:</strong> 74110</div>
        "#;
        let details = colon_labeled_details(&page_text(html));
        assert_eq!(details.notes, "jasmine, bergamot, honey");
        assert_eq!(details.region, "Gedeb, Gedeo, Ethiopia");
        assert_eq!(details.country, "Ethiopia");
        assert_eq!(details.producer, "Worka Cooperative");
        assert_eq!(details.process, "Washed");
        assert_eq!(details.variety, "74110");
    }

    #[test]
    fn pipe_labels_extract_origin_and_sip_notes() {
        let html = r#"
          <p>TAKE A SIP | strawberry jam, cocoa nib, brown sugar</p>
          <p>Origin | Santa Maria, Huila, Colombia</p>
          <p>Producer | Nestor Lasso</p>
          <p>Process | Natural</p>
          <p>Variety | Pink Bourbon</p>
        "#;
        let details = pipe_labeled_details(&page_text(html));
        assert_eq!(details.notes, "strawberry jam, cocoa nib, brown sugar");
        assert_eq!(details.region, "Santa Maria, Huila, Colombia");
        assert_eq!(details.country, "Colombia");
        assert_eq!(details.producer, "Nestor Lasso");
    }

    #[test]
    fn og_image_beats_first_img() {
        let html = r#"
          <head><meta property="og:image" content="https://cdn.test/og.jpg"></head>
          <body><img src="https://cdn.test/other.jpg"></body>
        "#;
        assert_eq!(page_image(html), "https://cdn.test/og.jpg");
        assert_eq!(page_image("<img src='https://cdn.test/only.jpg'>"), "https://cdn.test/only.jpg");
    }

    #[test]
    fn country_needs_at_least_two_components() {
        assert_eq!(country_from_region("Huila, Colombia").as_deref(), Some("Colombia"));
        assert_eq!(country_from_region("Colombia"), None);
    }

    #[test]
    fn detail_fields_keep_listing_image_when_absent() {
        let mut product = Product::new("Acme", "X", "https://acme.test/products/x");
        product.image = "https://cdn.test/listing.jpg".into();
        DetailFields::default().apply_to(&mut product);
        assert_eq!(product.image, "https://cdn.test/listing.jpg");

        let details = DetailFields {
            image: "https://cdn.test/detail.jpg".into(),
            ..DetailFields::default()
        };
        details.apply_to(&mut product);
        assert_eq!(product.image, "https://cdn.test/detail.jpg");
    }
}
