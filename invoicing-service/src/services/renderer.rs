//! HTML rendering of invoices and quotations.
//!
//! The template auto-escapes every interpolated value, so user-supplied
//! names, notes and item text cannot inject markup.

use crate::models::{DocumentContent, PartyBlock};
use crate::services::totals::Totals;
use askama::Template;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;

/// Party block with every line resolved to text.
struct PartyLines<'a> {
    name: &'a str,
    company: &'a str,
    address_line1: &'a str,
    address_line2: &'a str,
    phone: &'a str,
    email: &'a str,
}

impl<'a> From<&'a PartyBlock> for PartyLines<'a> {
    fn from(party: &'a PartyBlock) -> Self {
        Self {
            name: party.name.as_deref().unwrap_or_default(),
            company: party.company.as_deref().unwrap_or_default(),
            address_line1: party.address_line1.as_deref().unwrap_or_default(),
            address_line2: party.address_line2.as_deref().unwrap_or_default(),
            phone: party.phone.as_deref().unwrap_or_default(),
            email: party.email.as_deref().unwrap_or_default(),
        }
    }
}

struct ItemRow<'a> {
    title: &'a str,
    description: &'a str,
    quantity: String,
    unit_price: String,
    line_total: String,
}

#[derive(Template)]
#[template(path = "document.html")]
struct DocumentTemplate<'a> {
    title: &'a str,
    number: &'a str,
    logo_url: Option<&'a str>,
    bill_to: PartyLines<'a>,
    from: PartyLines<'a>,
    date_label: &'a str,
    issued_at: &'a str,
    deadline_label: &'a str,
    deadline: &'a str,
    payment_terms: &'a str,
    project: &'a str,
    items: Vec<ItemRow<'a>>,
    subtotal: String,
    tax_label: String,
    tax: String,
    total: String,
    terms: &'a [String],
    contact_email: &'a str,
    contact_phone: &'a str,
}

/// Render a complete, self-contained HTML page for `doc`.
///
/// Output depends only on `doc`: the same input always yields the same bytes.
pub fn render_document(doc: &DocumentContent) -> Result<String, AppError> {
    let totals = Totals::compute(&doc.items, doc.tax_rate)?;
    let currency = doc.currency.as_str();

    let items = doc
        .items
        .iter()
        .map(|item| {
            let line_total = item.line_total().unwrap_or_default();
            ItemRow {
                title: &item.title,
                description: item.description.as_deref().unwrap_or_default(),
                quantity: item.quantity.normalize().to_string(),
                unit_price: format_money(item.unit_price, currency),
                line_total: format_money(line_total, currency),
            }
        })
        .collect();

    let template = DocumentTemplate {
        title: doc.kind.title(),
        number: &doc.number,
        logo_url: doc.logo_url.as_deref().filter(|url| !url.trim().is_empty()),
        bill_to: PartyLines::from(&doc.bill_to),
        from: PartyLines::from(&doc.from),
        date_label: doc.kind.date_label(),
        issued_at: &doc.issued_at,
        deadline_label: doc.kind.deadline_label(),
        deadline: doc.deadline.as_deref().unwrap_or_default(),
        payment_terms: doc.payment_terms.as_deref().unwrap_or_default(),
        project: doc.project.as_deref().unwrap_or_default(),
        items,
        subtotal: format_money(totals.subtotal, currency),
        tax_label: tax_label(doc.tax_rate),
        tax: format_money(totals.tax, currency),
        total: format_money(totals.total, currency),
        terms: &doc.terms,
        contact_email: doc.contact_email.as_deref().unwrap_or_default(),
        contact_phone: doc.contact_phone.as_deref().unwrap_or_default(),
    };

    template
        .render()
        .map_err(|e| AppError::RenderError(format!("Template rendering failed: {}", e)))
}

/// `Tax (8.50%)` for a rate of `0.085`.
pub fn tax_label(rate: Decimal) -> String {
    let percent = rate
        .checked_mul(Decimal::ONE_HUNDRED)
        .unwrap_or_default()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("Tax ({:.2}%)", percent)
}

/// Two decimals with thousands separators: `$2,800.00` for USD,
/// `EUR 2,800.00` for anything else.
pub fn format_money(amount: Decimal, currency: &str) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    let digits = format!("{:.2}", rounded.abs());
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if currency.eq_ignore_ascii_case("USD") {
        format!("{}${}.{}", sign, grouped, fraction)
    } else {
        format!("{}{} {}.{}", sign, currency, grouped, fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentItem, DocumentKind};
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sample(kind: DocumentKind) -> DocumentContent {
        DocumentContent {
            kind,
            number: "QT-2024-001".into(),
            bill_to: PartyBlock {
                name: Some("John Smith".into()),
                company: Some("ABC Corporation".into()),
                email: Some("john@abccorp.com".into()),
                ..Default::default()
            },
            from: PartyBlock {
                name: Some("Your Company".into()),
                ..Default::default()
            },
            project: Some("Website".into()),
            issued_at: "2024-12-15".into(),
            deadline: Some("2025-01-15".into()),
            payment_terms: Some("Net 30 Days".into()),
            items: vec![
                DocumentItem {
                    title: "Website Design".into(),
                    description: Some("Responsive layout".into()),
                    quantity: d("1"),
                    unit_price: d("2500"),
                },
                DocumentItem {
                    title: "Training".into(),
                    description: None,
                    quantity: d("2"),
                    unit_price: d("150"),
                },
            ],
            tax_rate: d("0.085"),
            terms: vec!["Payment is due within 30 days".into()],
            logo_url: Some("https://example.com/logo.png".into()),
            contact_email: Some("info@example.com".into()),
            contact_phone: Some("(555) 987-6543".into()),
            currency: "USD".into(),
        }
    }

    #[test]
    fn money_is_grouped_with_two_decimals() {
        assert_eq!(format_money(d("2800"), "USD"), "$2,800.00");
        assert_eq!(format_money(d("1234567.891"), "USD"), "$1,234,567.89");
        assert_eq!(format_money(d("0.5"), "USD"), "$0.50");
        assert_eq!(format_money(d("999"), "EUR"), "EUR 999.00");
        assert_eq!(format_money(d("-1500"), "USD"), "-$1,500.00");
    }

    #[test]
    fn tax_label_shows_percent_with_two_decimals() {
        assert_eq!(tax_label(d("0.085")), "Tax (8.50%)");
        assert_eq!(tax_label(Decimal::ZERO), "Tax (0.00%)");
    }

    #[test]
    fn renders_invoice_sections_and_totals() {
        let html = render_document(&sample(DocumentKind::Invoice)).unwrap();

        assert!(html.contains("INVOICE"));
        assert!(html.contains("Invoice Date"));
        assert!(html.contains("Due Date"));
        assert!(html.contains("$2,800.00"));
        assert!(html.contains("Tax (8.50%)"));
        assert!(html.contains("$238.00"));
        assert!(html.contains("$3,038.00"));
        assert!(html.contains("$300.00"));
        assert!(html.contains("Thank you for your business!"));
        assert!(html.contains("info@example.com"));
    }

    #[test]
    fn quotation_uses_quote_labels() {
        let html = render_document(&sample(DocumentKind::Quotation)).unwrap();
        assert!(html.contains("QUOTATION"));
        assert!(html.contains("Quote Date"));
        assert!(html.contains("Valid Until"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let doc = sample(DocumentKind::Quotation);
        assert_eq!(render_document(&doc).unwrap(), render_document(&doc).unwrap());
    }

    #[test]
    fn user_content_is_escaped() {
        let mut doc = sample(DocumentKind::Invoice);
        doc.bill_to.name = Some("<script>alert(1)</script>".into());
        doc.items[0].title = "<b>bold</b>".into();

        let html = render_document(&doc).unwrap();

        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<b>bold</b>"));
    }

    #[test]
    fn missing_optional_fields_render_empty() {
        let doc = DocumentContent {
            kind: DocumentKind::Invoice,
            number: String::new(),
            bill_to: PartyBlock::default(),
            from: PartyBlock::default(),
            project: None,
            issued_at: String::new(),
            deadline: None,
            payment_terms: None,
            items: vec![],
            tax_rate: Decimal::ZERO,
            terms: vec![],
            logo_url: None,
            contact_email: None,
            contact_phone: None,
            currency: "USD".into(),
        };

        let html = render_document(&doc).unwrap();
        assert!(html.contains("$0.00"));
        assert!(!html.contains("<img"));
        assert!(!html.contains("Terms &amp; Conditions"));
    }
}
