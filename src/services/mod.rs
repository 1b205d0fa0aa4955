// Booking core
pub mod availability;
pub mod bookings;
pub mod checkout;
pub mod pricing;

// Payments
pub mod payments;

// Catalog and staff
pub mod products;
pub mod staff;
