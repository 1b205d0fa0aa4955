pub mod blackout_date;
pub mod booking;
pub mod checkout_draft;
pub mod distance_fee;
pub mod pickup_request;
pub mod pricing_setting;
pub mod product;
pub mod staff_user;
