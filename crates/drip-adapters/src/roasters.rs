//! The monitored roasters, one adapter each.
//!
//! Listing selectors and detail label patterns are per-site; everything else
//! goes through the shared helpers in the crate root. To monitor a new
//! roaster, add an adapter here and register it in [`all_adapters`].

use crate::{
    capture1, colon_labeled_details, country_from_region, meta_description, page_image, page_text,
    parse_listing_with, pipe_labeled_details, DetailFields, ListingSelectors, Product,
    RoasterAdapter,
};

struct BlackWhite;

impl RoasterAdapter for BlackWhite {
    fn name(&self) -> &'static str {
        "Black & White Coffee Roasters"
    }

    fn listing_url(&self) -> &'static str {
        "https://www.blackwhiteroasters.com/collections/all-coffee"
    }

    fn parse_listing(&self, html: &str) -> Vec<Product> {
        const SELECTORS: ListingSelectors = ListingSelectors {
            product: "product-block",
            title: "div.product-block__title",
            link: "a.product-link",
            price: Some("span.price__current"),
            sold_out: Some("span.price-label--sold-out"),
        };
        parse_listing_with(self.name(), self.listing_url(), &SELECTORS, html)
    }

    fn parse_details(&self, html: &str) -> DetailFields {
        let mut details = pipe_labeled_details(&page_text(html));
        details.image = page_image(html);
        details
    }
}

struct Moonwake;

impl RoasterAdapter for Moonwake {
    fn name(&self) -> &'static str {
        "Moonwake Coffee Roasters"
    }

    fn listing_url(&self) -> &'static str {
        "https://moonwakecoffeeroasters.com/pages/shop-coffees"
    }

    fn parse_listing(&self, html: &str) -> Vec<Product> {
        const SELECTORS: ListingSelectors = ListingSelectors {
            product: "li.grid__item, div.product-grid__item, div.collection-product, \
                      div.card__content, div.card-information",
            title: "a[href*='/products/'], h3.card__heading a",
            link: "a[href*='/products/']",
            price: Some("span.price-item, span.price-item--regular, span.price, span.money"),
            sold_out: Some("span.badge--sold-out, span.sold-out, button[disabled], p.sold-out"),
        };
        parse_listing_with(self.name(), self.listing_url(), &SELECTORS, html)
    }

    fn parse_details(&self, html: &str) -> DetailFields {
        let mut details = colon_labeled_details(&page_text(html));
        details.image = page_image(html);
        details
    }
}

struct Sey;

impl RoasterAdapter for Sey {
    fn name(&self) -> &'static str {
        "SEY Coffee"
    }

    fn listing_url(&self) -> &'static str {
        "https://www.seycoffee.com/collections/coffee"
    }

    fn parse_listing(&self, html: &str) -> Vec<Product> {
        // Minimal listing markup; the anchors are all there is.
        const SELECTORS: ListingSelectors = ListingSelectors {
            product: "a[href*='/products/']",
            title: "a[href*='/products/']",
            link: "a[href*='/products/']",
            price: None,
            sold_out: None,
        };
        parse_listing_with(self.name(), self.listing_url(), &SELECTORS, html)
    }

    fn parse_details(&self, html: &str) -> DetailFields {
        let text = page_text(html);
        let mut details = DetailFields::default();
        if let Some(notes) = capture1(&text, r"In the cup we find ([^.\n]+)", false) {
            details.notes = notes;
        }
        if let Some(region) = capture1(&text, r"REGION\s*\n\s*([^\n]+)", false) {
            if let Some(country) = country_from_region(&region) {
                details.country = country;
            }
            details.region = region;
        }
        if let Some(producer) = capture1(&text, r"PRODUCER\s*\n\s*([^\n]+)", false) {
            details.producer = producer;
        }
        if let Some(process) = capture1(&text, r"PROCESSING\s*\n\s*([^\n]+)", false) {
            details.process = process;
        }
        if let Some(variety) = capture1(&text, r"VARIETAL\s*\n\s*([^\n]+)", false) {
            details.variety = variety;
        }
        details.image = page_image(html);
        details
    }
}

struct Prodigal;

impl RoasterAdapter for Prodigal {
    fn name(&self) -> &'static str {
        "Prodigal Coffee"
    }

    fn listing_url(&self) -> &'static str {
        "https://getprodigal.com/collections/roasted-coffee"
    }

    fn parse_listing(&self, html: &str) -> Vec<Product> {
        const SELECTORS: ListingSelectors = ListingSelectors {
            product: "a[href*='/products/']",
            title: "a[href*='/products/']",
            link: "a[href*='/products/']",
            price: None,
            sold_out: None,
        };
        parse_listing_with(self.name(), self.listing_url(), &SELECTORS, html)
    }

    fn parse_details(&self, html: &str) -> DetailFields {
        let mut details = colon_labeled_details(&page_text(html));
        // Tasting notes live in the meta description, usually after a dash.
        if let Some(description) = meta_description(html) {
            details.notes = capture1(&description, r"–\s*([^\n]+)", false).unwrap_or(description);
        }
        details.image = page_image(html);
        details
    }
}

struct Hydrangea;

impl RoasterAdapter for Hydrangea {
    fn name(&self) -> &'static str {
        "Hydrangea Coffee Roasters"
    }

    fn listing_url(&self) -> &'static str {
        "https://hydrangea.coffee/"
    }

    fn parse_listing(&self, html: &str) -> Vec<Product> {
        const SELECTORS: ListingSelectors = ListingSelectors {
            product: "a[href*='/products/']",
            title: "a[href*='/products/']",
            link: "a[href*='/products/']",
            price: None,
            sold_out: None,
        };
        parse_listing_with(self.name(), self.listing_url(), &SELECTORS, html)
    }

    fn parse_details(&self, html: &str) -> DetailFields {
        let text = page_text(html);
        let mut details = DetailFields::default();
        if let Some(notes) = capture1(&text, r"Tastes Like:\s*([^\n]+)", false) {
            details.notes = notes;
        }
        if let Some(region) = capture1(&text, r"Origin:\s*([^\n]+)", false) {
            if let Some(country) = country_from_region(&region) {
                details.country = country;
            }
            details.region = region;
        }
        if let Some(variety) = capture1(&text, r"Variety:\s*([^\n]+)", false) {
            details.variety = variety;
        }
        if let Some(producer) = capture1(&text, r"Producer:\s*([^\n]+)", false) {
            details.producer = producer;
        }
        if let Some(process) = capture1(&text, r"Process:\s*([^\n]+)", false) {
            details.process = process;
        }
        details.image = page_image(html);
        details
    }
}

struct Brandywine;

impl RoasterAdapter for Brandywine {
    fn name(&self) -> &'static str {
        "Brandywine Coffee Roasters"
    }

    fn listing_url(&self) -> &'static str {
        "https://www.brandywinecoffeeroasters.com/collections/all-coffee-1"
    }

    fn parse_listing(&self, html: &str) -> Vec<Product> {
        const SELECTORS: ListingSelectors = ListingSelectors {
            product: "li.grid__item, div.product-grid__item, div.collection-product, \
                      div.product-card",
            title: "a[href*='/products/']",
            link: "a[href*='/products/']",
            price: Some("span.price-item, span.price-item--regular, span.money"),
            sold_out: Some(
                "span.badge--sold-out, span.sold-out, button[disabled], span.sold-out-badge",
            ),
        };
        parse_listing_with(self.name(), self.listing_url(), &SELECTORS, html)
    }

    fn parse_details(&self, html: &str) -> DetailFields {
        let mut details = pipe_labeled_details(&page_text(html));
        details.image = page_image(html);
        details
    }
}

/// Every monitored roaster, in the order sources are processed each run.
pub fn all_adapters() -> Vec<Box<dyn RoasterAdapter>> {
    vec![
        Box::new(BlackWhite),
        Box::new(Moonwake),
        Box::new(Sey),
        Box::new(Prodigal),
        Box::new(Hydrangea),
        Box::new(Brandywine),
    ]
}

/// Resolve one adapter by roaster name.
pub fn adapter_for(name: &str) -> Option<Box<dyn RoasterAdapter>> {
    all_adapters().into_iter().find(|a| a.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector_parses;

    #[test]
    fn registry_resolves_every_configured_roaster() {
        let adapters = all_adapters();
        assert_eq!(adapters.len(), 6);
        for adapter in &adapters {
            assert!(adapter_for(adapter.name()).is_some());
            assert!(adapter.listing_url().starts_with("https://"));
        }
        assert!(adapter_for("Nonexistent Roasters").is_none());
    }

    #[test]
    fn every_adapter_parses_its_own_selectors() {
        // A selector typo would silently yield zero products and mark the
        // whole roaster out of stock; fail here instead.
        let cases = [
            "product-block",
            "div.product-block__title",
            "a.product-link",
            "span.price__current",
            "span.price-label--sold-out",
            "li.grid__item, div.product-grid__item, div.collection-product, \
             div.card__content, div.card-information",
            "a[href*='/products/'], h3.card__heading a",
            "span.price-item, span.price-item--regular, span.price, span.money",
            "span.badge--sold-out, span.sold-out, button[disabled], p.sold-out",
            "li.grid__item, div.product-grid__item, div.collection-product, \
             div.product-card",
            "span.badge--sold-out, span.sold-out, button[disabled], span.sold-out-badge",
        ];
        for selector in cases {
            assert!(selector_parses(selector), "bad selector: {selector}");
        }
    }

    #[test]
    fn sey_detail_labels_use_uppercase_sections() {
        let html = r#"
          <p>In the cup we find nectarine, honeysuckle, and yellow plum.</p>
          <h4>REGION</h4><p>Gedeb, Ethiopia</p>
          <h4>PRODUCER</h4><p>Mebrahtu Aynalem</p>
          <h4>PROCESSING</h4><p>Whole Cherry Natural</p>
          <h4>VARIETAL</h4><p>Landrace</p>
        "#;
        let details = Sey.parse_details(html);
        assert_eq!(details.notes, "nectarine, honeysuckle, and yellow plum");
        assert_eq!(details.region, "Gedeb, Ethiopia");
        assert_eq!(details.country, "Ethiopia");
        assert_eq!(details.producer, "Mebrahtu Aynalem");
        assert_eq!(details.process, "Whole Cherry Natural");
        assert_eq!(details.variety, "Landrace");
    }

    #[test]
    fn prodigal_notes_come_from_meta_description() {
        let html = r#"
          <head><meta name="description" content="Finca El Diviso – jasmine florals, ripe peach, cane sugar"></head>
          <body><p>Process: Washed</p><p>Region: Huila, Colombia</p></body>
        "#;
        let details = Prodigal.parse_details(html);
        assert_eq!(details.notes, "jasmine florals, ripe peach, cane sugar");
        assert_eq!(details.process, "Washed");
        assert_eq!(details.country, "Colombia");
    }

    #[test]
    fn hydrangea_tastes_like_labels() {
        let html = r#"
          <p>Tastes Like: strawberry candy, lychee</p>
          <p>Origin: Cauca, Colombia</p>
          <p>Process: Thermal Shock Natural</p>
        "#;
        let details = Hydrangea.parse_details(html);
        assert_eq!(details.notes, "strawberry candy, lychee");
        assert_eq!(details.region, "Cauca, Colombia");
        assert_eq!(details.country, "Colombia");
        assert_eq!(details.process, "Thermal Shock Natural");
    }

    #[test]
    fn blackwhite_listing_uses_product_blocks() {
        let html = r#"
          <product-block>
            <div class="product-block__title">The Natural</div>
            <a class="product-link" href="/products/the-natural"></a>
            <span class="price__current">$19.00</span>
          </product-block>
          <product-block>
            <div class="product-block__title">Sugar Plum</div>
            <a class="product-link" href="/products/sugar-plum"></a>
            <span class="price__current">$22.00</span>
            <span class="price-label--sold-out">Sold out</span>
          </product-block>
        "#;
        let items = BlackWhite.parse_listing(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "The Natural");
        assert_eq!(
            items[0].url,
            "https://www.blackwhiteroasters.com/products/the-natural"
        );
        assert_eq!(items[0].price_text, "$19.00");
        assert!(items[0].in_stock);
        assert!(!items[1].in_stock);
    }
}
