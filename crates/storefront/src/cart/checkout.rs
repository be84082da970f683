//! WhatsApp order handoff.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};
use vitrine_core::{CartItem, Price};

const WHATSAPP_BASE_URL: &str = "https://wa.me/";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Checkout phone number is not configured")]
    InvalidPhone,

    #[error("Could not build order message: {0}")]
    Message(#[from] std::fmt::Error),

    #[error("Handoff failed: {0}")]
    Handoff(String),
}

/// Opens the messaging deep link.
#[async_trait]
pub trait Handoff: Send + Sync {
    async fn open(&self, url: &str) -> Result<(), CheckoutError>;
}

/// Handoff for server-hosted carts: the link is returned to the client,
/// which opens it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReturnLink;

#[async_trait]
impl Handoff for ReturnLink {
    async fn open(&self, url: &str) -> Result<(), CheckoutError> {
        debug!(len = url.len(), "Returning checkout link to client");
        Ok(())
    }
}

/// Builds the order message and hands it off.
#[derive(Clone)]
pub struct WhatsAppCheckout {
    phone: String,
    handoff: Arc<dyn Handoff>,
}

impl WhatsAppCheckout {
    /// `phone` keeps only its digits.
    #[must_use]
    pub fn new(phone: &str, handoff: Arc<dyn Handoff>) -> Self {
        Self {
            phone: phone.chars().filter(char::is_ascii_digit).collect(),
            handoff,
        }
    }

    #[must_use]
    pub fn phone(&self) -> &str {
        &self.phone
    }

    /// Deep link carrying `message`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InvalidPhone`] if no phone number is set.
    pub fn link(&self, message: &str) -> Result<String, CheckoutError> {
        if self.phone.is_empty() {
            return Err(CheckoutError::InvalidPhone);
        }
        Ok(format!(
            "{WHATSAPP_BASE_URL}{}?text={}",
            self.phone,
            urlencoding::encode(message)
        ))
    }

    /// Build the order for `cart`, open the link, and return it.
    ///
    /// # Errors
    ///
    /// Fails on an empty cart, a missing phone number, or a failed handoff.
    #[instrument(skip(self, cart), fields(lines = cart.len()))]
    pub async fn send(&self, cart: &[CartItem]) -> Result<String, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let message = order_message(cart)?;
        let url = self.link(&message)?;
        self.handoff.open(&url).await?;
        Ok(url)
    }
}

/// The pt-BR order message for `cart`.
///
/// # Errors
///
/// Returns an error only if formatting fails.
pub fn order_message(cart: &[CartItem]) -> Result<String, CheckoutError> {
    let mut message = String::from("Olá! Gostaria de fazer um pedido:\n\n");

    for (index, item) in cart.iter().enumerate() {
        writeln!(message, "{}. {} - {}", index + 1, item.name, item.brand)?;
        writeln!(message, "   Quantidade: {}", item.quantity)?;
        writeln!(message, "   Valor unitário: {}", item.price)?;
        writeln!(message, "   Subtotal: {}", item.line_total())?;
        message.push('\n');
    }

    let total_items: u64 = cart.iter().map(|item| u64::from(item.quantity)).sum();
    let total: Price = cart.iter().map(CartItem::line_total).sum();
    writeln!(message, "Total de itens: {total_items}")?;
    write!(message, "Total: {total}")?;

    Ok(message)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vitrine_core::ProductId;

    use super::*;

    fn item(id: &str, price: &str, quantity: u32) -> CartItem {
        CartItem {
            id: ProductId::new(id),
            name: format!("Relógio {id}"),
            price: price.to_string(),
            image: "x".to_string(),
            brand: "Omega".to_string(),
            quantity,
        }
    }

    #[test]
    fn test_order_message_layout() {
        let cart = vec![item("A", "R$ 100,00", 2), item("B", "R$ 1.000,50", 1)];
        let expected = "Olá! Gostaria de fazer um pedido:\n\n\
            1. Relógio A - Omega\n   Quantidade: 2\n   Valor unitário: R$ 100,00\n   Subtotal: R$ 200,00\n\n\
            2. Relógio B - Omega\n   Quantidade: 1\n   Valor unitário: R$ 1.000,50\n   Subtotal: R$ 1.000,50\n\n\
            Total de itens: 3\nTotal: R$ 1.200,50";
        assert_eq!(order_message(&cart).unwrap(), expected);
    }

    #[test]
    fn test_order_message_with_extreme_values() {
        let cart = vec![
            item("A", "R$ 79.228.162.514.264.337.593.543.950.335", 2),
            item("B", "R$ 10,00", u32::MAX),
        ];
        let message = order_message(&cart).unwrap();
        assert!(message.contains("Subtotal: R$ 42.949.672.950,00"));
        assert!(message.contains("Total de itens: 4294967297"));
        assert!(message.ends_with("Total: R$ 79.228.162.514.264.337.593.543.950.335,00"));
    }

    #[test]
    fn test_link_encodes_message() {
        let checkout = WhatsAppCheckout::new("+55 (11) 99999-0000", Arc::new(ReturnLink));
        assert_eq!(checkout.phone(), "5511999990000");
        assert_eq!(
            checkout.link("Olá! 1 & 2").unwrap(),
            "https://wa.me/5511999990000?text=Ol%C3%A1%21%201%20%26%202"
        );
    }

    #[tokio::test]
    async fn test_missing_phone_fails() {
        let checkout = WhatsAppCheckout::new("", Arc::new(ReturnLink));
        let result = checkout.send(&[item("A", "R$ 1,00", 1)]).await;
        assert!(matches!(result, Err(CheckoutError::InvalidPhone)));
    }

    #[tokio::test]
    async fn test_empty_cart_fails_before_handoff() {
        let checkout = WhatsAppCheckout::new("5511999990000", Arc::new(ReturnLink));
        assert!(matches!(checkout.send(&[]).await, Err(CheckoutError::EmptyCart)));
    }
}
