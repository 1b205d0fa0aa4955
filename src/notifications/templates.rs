//! Subjects, SMS bodies and email bodies for each notification kind.

use chrono::NaiveDate;

use super::NotificationKind;
use crate::entities::{booking, pickup_request, product};

pub struct TemplateContext<'a> {
    pub booking: &'a booking::Model,
    pub product: &'a product::Model,
    pub pickup: Option<&'a pickup_request::Model>,
    pub site_name: &'a str,
    pub public_base_url: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub text: String,
    pub html: String,
    pub sms: String,
}

/// "Jun 01"
fn short_date(date: NaiveDate) -> String {
    date.format("%b %d").to_string()
}

fn long_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

impl TemplateContext<'_> {
    fn pickup_date(&self) -> Option<NaiveDate> {
        self.pickup
            .map(|p| p.requested_pickup_date)
            .or(self.booking.pickup_date)
    }

    fn pickup_address(&self) -> &str {
        self.pickup
            .and_then(|p| p.pickup_address.as_deref())
            .unwrap_or(&self.booking.delivery_address)
    }

    fn full_delivery_address(&self) -> String {
        let b = self.booking;
        format!(
            "{}, {}, {} {}",
            b.delivery_address, b.delivery_city, b.delivery_state, b.delivery_zip
        )
    }

    fn booking_url(&self) -> String {
        format!(
            "{}/booking/confirmation/{}/",
            self.public_base_url.trim_end_matches('/'),
            self.booking.booking_id
        )
    }
}

pub fn render(kind: NotificationKind, ctx: &TemplateContext<'_>) -> Rendered {
    let b = ctx.booking;
    let product = &ctx.product.name;

    let (subject, sms, lines) = match kind {
        NotificationKind::BookingConfirmation => (
            format!("Booking Confirmed - {}", b.booking_id),
            format!(
                "Your rental is confirmed! Delivery on {}. Booking ID: {}",
                short_date(b.drop_off_date),
                b.booking_id
            ),
            vec![
                format!("Thank you, {}. Your {} rental is confirmed.", b.customer_name, product),
                format!("Booking ID: {}", b.booking_id),
                format!("Delivery date: {}", long_date(b.drop_off_date)),
                format!("Delivery address: {}", ctx.full_delivery_address()),
                format!("Rental period: {} month(s) at ${} per month", b.rental_months, b.monthly_rate),
                format!("Transport fee: ${}", b.transport_fee),
                format!("Total paid: ${}", b.total_amount),
            ],
        ),
        NotificationKind::DropOffReminder => (
            format!("Delivery Tomorrow - {product}"),
            format!(
                "Reminder: Your {} will be delivered tomorrow at {}",
                product, b.delivery_address
            ),
            vec![
                format!("Hi {}, your {} arrives tomorrow.", b.customer_name, product),
                format!("Delivery date: {}", long_date(b.drop_off_date)),
                format!("Delivery address: {}", ctx.full_delivery_address()),
                "Please make sure the drop-off area is clear and accessible.".to_string(),
            ],
        ),
        NotificationKind::PickupConfirmation => {
            let date = ctx.pickup_date().unwrap_or(b.drop_off_date);
            (
                format!("Pickup Scheduled - {}", b.booking_id),
                format!(
                    "Pickup scheduled for {}. We'll collect your {}.",
                    short_date(date),
                    product
                ),
                vec![
                    format!("Hi {}, your pickup is scheduled.", b.customer_name),
                    format!("Booking ID: {}", b.booking_id),
                    format!("Pickup date: {}", long_date(date)),
                    format!("Pickup address: {}", ctx.pickup_address()),
                ],
            )
        }
        NotificationKind::PickupReminder => {
            let date = ctx.pickup_date().unwrap_or(b.drop_off_date);
            (
                format!("Pickup Reminder - {}", b.booking_id),
                format!(
                    "Reminder: Pickup scheduled for tomorrow at {}",
                    ctx.pickup_address()
                ),
                vec![
                    format!("Hi {}, we're collecting your {} tomorrow.", b.customer_name, product),
                    format!("Pickup date: {}", long_date(date)),
                    format!("Pickup address: {}", ctx.pickup_address()),
                    "Please make sure the unit is empty and reachable.".to_string(),
                ],
            )
        }
    };

    let url = ctx.booking_url();
    let text = format!(
        "{}\n\nView your booking: {}\n\n{}\n",
        lines.join("\n"),
        url,
        ctx.site_name
    );
    let html = format!(
        "<html><body><h2>{}</h2>{}<p><a href=\"{}\">View your booking</a></p><p>{}</p></body></html>",
        escape_html(&subject),
        lines
            .iter()
            .map(|l| format!("<p>{}</p>", escape_html(l)))
            .collect::<String>(),
        escape_html(&url),
        escape_html(ctx.site_name),
    );

    Rendered {
        subject,
        text,
        html,
        sms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::booking::{BookingStatus, PaymentStatus};
    use crate::entities::pickup_request::PickupPaymentStatus;
    use crate::entities::product::ProductCategory;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn fixtures() -> (booking::Model, product::Model, pickup_request::Model) {
        let now = Utc::now();
        let booking = booking::Model {
            id: 7,
            booking_id: Uuid::nil(),
            product_id: 1,
            customer_name: "Ada <Admin>".into(),
            customer_email: "ada@example.com".into(),
            customer_phone: "5551234567".into(),
            delivery_address: "1 Main St".into(),
            delivery_city: "Springfield".into(),
            delivery_state: "IL".into(),
            delivery_zip: "62701".into(),
            delivery_notes: String::new(),
            drop_off_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            pickup_date: Some(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()),
            rental_months: 1,
            monthly_rate: dec!(150.00),
            transport_fee: dec!(80.00),
            total_amount: dec!(230.00),
            stripe_payment_intent_id: None,
            stripe_charge_id: None,
            payment_status: PaymentStatus::Paid,
            status: BookingStatus::PickupScheduled,
            confirmation_email_sent: false,
            confirmation_sms_sent: false,
            drop_off_reminder_sent: false,
            pickup_reminder_sent: false,
            created_at: now,
            updated_at: now,
            confirmed_at: Some(now),
        };
        let product = product::Model {
            id: 1,
            name: "8ft Pod".into(),
            slug: "8ft-pod".into(),
            category: ProductCategory::StoragePod,
            description: String::new(),
            size_description: "8x7x7".into(),
            monthly_rate: dec!(150.00),
            image_url: None,
            stock_quantity: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let pickup = pickup_request::Model {
            id: 3,
            booking_id: 7,
            requested_pickup_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            pickup_address: Some("9 Side Rd".into()),
            pickup_notes: String::new(),
            stripe_payment_intent_id: None,
            payment_status: PickupPaymentStatus::Paid,
            pickup_email_sent: false,
            pickup_sms_sent: false,
            created_at: now,
            confirmed_at: Some(now),
        };
        (booking, product, pickup)
    }

    #[test]
    fn confirmation_texts() {
        let (booking, product, _) = fixtures();
        let ctx = TemplateContext {
            booking: &booking,
            product: &product,
            pickup: None,
            site_name: "Rental Services",
            public_base_url: "https://rentals.example.com/",
        };
        let rendered = render(NotificationKind::BookingConfirmation, &ctx);
        assert_eq!(
            rendered.subject,
            "Booking Confirmed - 00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            rendered.sms,
            "Your rental is confirmed! Delivery on Jun 01. Booking ID: 00000000-0000-0000-0000-000000000000"
        );
        assert!(rendered.text.contains("https://rentals.example.com/booking/confirmation/"));
        assert!(rendered.html.contains("Ada &lt;Admin&gt;"));
        assert!(!rendered.html.contains("<Admin>"));
    }

    #[test]
    fn pickup_reminder_prefers_pickup_address() {
        let (booking, product, pickup) = fixtures();
        let with_pickup = TemplateContext {
            booking: &booking,
            product: &product,
            pickup: Some(&pickup),
            site_name: "Rental Services",
            public_base_url: "",
        };
        assert_eq!(
            render(NotificationKind::PickupReminder, &with_pickup).sms,
            "Reminder: Pickup scheduled for tomorrow at 9 Side Rd"
        );

        let without = TemplateContext { pickup: None, ..with_pickup };
        assert_eq!(
            render(NotificationKind::PickupReminder, &without).sms,
            "Reminder: Pickup scheduled for tomorrow at 1 Main St"
        );
    }

    #[test]
    fn drop_off_and_pickup_confirmation_texts() {
        let (booking, product, pickup) = fixtures();
        let ctx = TemplateContext {
            booking: &booking,
            product: &product,
            pickup: Some(&pickup),
            site_name: "Rental Services",
            public_base_url: "",
        };
        assert_eq!(render(NotificationKind::DropOffReminder, &ctx).subject, "Delivery Tomorrow - 8ft Pod");
        assert_eq!(
            render(NotificationKind::PickupConfirmation, &ctx).sms,
            "Pickup scheduled for Jun 30. We'll collect your 8ft Pod."
        );
    }
}
