//! Preset extraction instructions for common invoice types.
//!
//! A template is only ever the *user instruction* part of the prompt; the
//! schema still decides which fields are validated. Pair a template with a
//! matching schema file when you want its extra fields enforced rather than
//! kept as extras.

use serde::Serialize;

/// A named, ready-made extraction instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PromptTemplate {
    pub key: &'static str,
    pub category: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
}

static TEMPLATES: &[PromptTemplate] = &[
    PromptTemplate {
        key: "essential_info",
        category: "Basic",
        name: "Essential Information",
        description: "Extract basic invoice details",
        prompt: "Extract the following essential information from this invoice:
- Invoice number
- Invoice date
- Vendor/seller name
- Customer/buyer name
- Total amount (including currency)
- Due date (if mentioned)",
    },
    PromptTemplate {
        key: "financial_summary",
        category: "Basic",
        name: "Financial Summary",
        description: "Extract all financial information",
        prompt: "Extract all financial information from this invoice:
- Subtotal amount
- Tax amount (VAT/GST/Sales tax)
- Discount amount (if any)
- Total/Grand total amount
- Currency used
- Tax rate percentage (if mentioned)",
    },
    PromptTemplate {
        key: "contact_details",
        category: "Basic",
        name: "Contact Information",
        description: "Extract contact information for both parties",
        prompt: "Extract contact information from this invoice:
- Vendor/seller contact details (name, address, phone, email)
- Customer/buyer contact details (name, address, phone, email)
- Tax registration numbers (GSTIN, VAT number, Tax ID)
- Any other identification numbers (PAN, IBAN, etc.)",
    },
    PromptTemplate {
        key: "indian_gst",
        category: "Regional",
        name: "Indian GST Invoice",
        description: "Extract GST-specific information",
        prompt: "Extract the following information from this Indian GST invoice:
- Invoice number and invoice date
- GSTIN of supplier and of recipient (if available)
- Place of supply
- HSN/SAC codes
- Taxable value
- CGST, SGST and IGST amounts and rates
- Total tax amount and total invoice value
- Vendor and buyer name and address",
    },
    PromptTemplate {
        key: "eu_vat",
        category: "Regional",
        name: "EU VAT Invoice",
        description: "Extract VAT-specific information",
        prompt: "Extract the following information from this European VAT invoice:
- Invoice number and invoice date
- VAT number of supplier and of customer (if available)
- Net amount, VAT amount, VAT rate percentage and gross amount
- Currency
- Supplier and customer details (name, address)
- Any IBAN or bank details",
    },
    PromptTemplate {
        key: "us_sales_tax",
        category: "Regional",
        name: "US Sales Tax Invoice",
        description: "Extract US sales tax information",
        prompt: "Extract the following information from this US invoice:
- Invoice number, invoice date and due date
- Vendor and customer name and address
- Subtotal, sales tax amount, sales tax rate and total amount
- Tax ID numbers (EIN, etc.)
- Payment terms",
    },
    PromptTemplate {
        key: "line_items",
        category: "Detailed",
        name: "Line Items Detail",
        description: "Extract detailed information about each item",
        prompt: "Extract detailed line item information from this invoice:
- List each product/service as a separate item
- For each item include: description, quantity, unit price, total price
- Include item-level discounts or taxes
- Include product codes, SKUs or HSN codes if available
- Note the unit of measurement (pieces, kg, hours, etc.)",
    },
    PromptTemplate {
        key: "payment_terms",
        category: "Detailed",
        name: "Payment Information",
        description: "Extract payment-related information",
        prompt: "Extract all payment-related information from this invoice:
- Payment terms (Net 30, Due on receipt, etc.) and due date
- Payment methods accepted
- Bank details (account number, routing number, IBAN, SWIFT code)
- Late payment penalties and early payment discounts
- Payment status (if mentioned)",
    },
    PromptTemplate {
        key: "flexible_extraction",
        category: "Helper",
        name: "Smart Extraction",
        description: "Extract everything important the invoice contains",
        prompt: "Analyze this invoice and extract all important information you can find:
basic invoice details, party information, financial breakdown (taxes, discounts, totals),
payment information, line items and any regulatory identifiers.
If certain information is not available, use null values.",
    },
];

/// Key of the template used when nothing more specific matches.
pub const DEFAULT_TEMPLATE: &str = "essential_info";

/// All presets in display order.
pub fn all() -> &'static [PromptTemplate] {
    TEMPLATES
}

pub fn get(key: &str) -> Option<&'static PromptTemplate> {
    TEMPLATES.iter().find(|t| t.key == key)
}

/// Keyword rules checked in order; the first rule with a hit wins.
const SUGGESTIONS: &[(&[&str], &str)] = &[
    (&["gst", "gstin", "indian", "india"], "indian_gst"),
    (&["vat", "european", "iban"], "eu_vat"),
    (&["sales tax", "american", "ein"], "us_sales_tax"),
    (&["items", "products", "line items", "detailed"], "line_items"),
    (&["payment", "bank", "due date", "terms"], "payment_terms"),
    (&["contact", "address", "phone", "email"], "contact_details"),
    (&["tax", "financial", "money", "amount"], "financial_summary"),
];

/// Pick the preset that best fits a free-form instruction.
///
/// Matching is on whole words (or word sequences), case-insensitive, so
/// "eu" inside "reuse" or "us" inside "status" never trigger a region.
pub fn suggest(instruction: &str) -> &'static PromptTemplate {
    let words: Vec<String> = instruction
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    let joined = format!(" {} ", words.join(" "));

    let key = SUGGESTIONS
        .iter()
        .find(|(needles, _)| {
            needles
                .iter()
                .any(|n| joined.contains(&format!(" {n} ")))
        })
        .map(|(_, key)| *key)
        .unwrap_or(DEFAULT_TEMPLATE);

    // Every key in SUGGESTIONS exists in TEMPLATES (checked by tests).
    get(key).unwrap_or(&TEMPLATES[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_unique_and_resolvable() {
        let mut keys: Vec<_> = all().iter().map(|t| t.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), all().len());
        for (_, key) in SUGGESTIONS {
            assert!(get(key).is_some(), "unknown suggestion target {key}");
        }
        assert!(get(DEFAULT_TEMPLATE).is_some());
    }

    #[test]
    fn suggests_by_keyword() {
        assert_eq!(suggest("Get the GSTIN and HSN codes").key, "indian_gst");
        assert_eq!(suggest("VAT number and IBAN please").key, "eu_vat");
        assert_eq!(suggest("Show the sales tax").key, "us_sales_tax");
        assert_eq!(suggest("List all line items").key, "line_items");
        assert_eq!(suggest("What are the payment terms?").key, "payment_terms");
        assert_eq!(suggest("vendor email").key, "contact_details");
        assert_eq!(suggest("total amount").key, "financial_summary");
        assert_eq!(suggest("invoice number").key, "essential_info");
    }

    #[test]
    fn no_substring_false_positives() {
        // "status" contains "us", "reuse" contains "eu", "taxi" contains "tax"
        assert_eq!(suggest("reuse the status of the taxi").key, "essential_info");
    }
}
