//! Plain-text invoice renderer.

use std::fmt::Write;

use async_trait::async_trait;
use domain::{InvoiceDocument, InvoiceError, InvoiceRenderer, OrderDetails};

/// Renders invoices as fixed-width plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextInvoiceRenderer;

impl TextInvoiceRenderer {
    fn render_text(details: &OrderDetails) -> Result<String, std::fmt::Error> {
        let order = &details.order;
        let totals = order.totals();
        let mut out = String::new();

        writeln!(out, "INVOICE #{}", order.id())?;
        writeln!(out, "Date:   {}", order.created_at().format("%Y-%m-%d"))?;
        writeln!(out, "Status: {}", order.status())?;
        match &details.user {
            Some(user) => writeln!(out, "Bill to: {} <{}>", user.name, user.email)?,
            None => writeln!(out, "Bill to: user {}", order.user_id())?,
        }
        writeln!(out)?;
        writeln!(
            out,
            "{:<32} {:>5} {:>12} {:>6} {:>12}",
            "Item", "Qty", "Unit", "Disc", "Amount"
        )?;
        for item in order.items() {
            writeln!(
                out,
                "{:<32} {:>5} {:>12} {:>6} {:>12}",
                item.product_name,
                item.quantity,
                item.unit_price.to_string(),
                item.discount.to_string(),
                (item.line_price() - item.line_discount()).to_string(),
            )?;
        }
        writeln!(out)?;
        for (label, amount) in [
            ("Subtotal", totals.products_price()),
            ("Discount", totals.products_discount_price()),
            ("Shipping", totals.shipping_price()),
            ("Tax", totals.tax_price()),
            ("Total", totals.total_price()),
        ] {
            writeln!(out, "{:>58} {:>12}", label, amount.to_string())?;
        }
        Ok(out)
    }
}

#[async_trait]
impl InvoiceRenderer for TextInvoiceRenderer {
    async fn render(&self, details: &OrderDetails) -> Result<InvoiceDocument, InvoiceError> {
        let text = Self::render_text(details).map_err(|e| InvoiceError(e.to_string()))?;
        Ok(InvoiceDocument {
            content_type: "text/plain; charset=utf-8".to_string(),
            file_name: format!("invoice-{}.txt", details.order.id()),
            bytes: text.into_bytes(),
        })
    }
}
