/*!
 * # Permissions
 *
 * Dashboard permissions are `resource:action` strings carried in the staff
 * JWT. Superusers hold the `admin` role and bypass permission checks.
 */

/// Permission actions
pub struct Actions;

impl Actions {
    pub const READ: &'static str = "read";
    pub const MANAGE: &'static str = "manage";
}

/// Resource types
pub struct Resources;

impl Resources {
    pub const DASHBOARD: &'static str = "dashboard";
    pub const ORDERS: &'static str = "orders";
    pub const INVENTORY: &'static str = "inventory";
    pub const PRICING: &'static str = "pricing";
    pub const BLACKOUTS: &'static str = "blackouts";
    pub const STAFF: &'static str = "staff";
}

pub mod consts {
    pub const DASHBOARD_READ: &str = "dashboard:read";
    pub const ORDERS_MANAGE: &str = "orders:manage";
    pub const INVENTORY_MANAGE: &str = "inventory:manage";
    pub const PRICING_MANAGE: &str = "pricing:manage";
    pub const BLACKOUTS_MANAGE: &str = "blackouts:manage";
    pub const STAFF_MANAGE: &str = "staff:manage";
}

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_STAFF: &str = "staff";

pub fn format_permission(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

/// Permissions granted to every active staff account.
pub fn staff_permissions() -> Vec<String> {
    vec![
        format_permission(Resources::DASHBOARD, Actions::READ),
        format_permission(Resources::ORDERS, Actions::MANAGE),
        format_permission(Resources::INVENTORY, Actions::MANAGE),
        format_permission(Resources::PRICING, Actions::MANAGE),
        format_permission(Resources::BLACKOUTS, Actions::MANAGE),
    ]
}

/// Roles and permissions for a staff account.
pub fn grants_for(is_superuser: bool) -> (Vec<String>, Vec<String>) {
    let mut roles = vec![ROLE_STAFF.to_string()];
    let mut permissions = staff_permissions();
    if is_superuser {
        roles.push(ROLE_ADMIN.to_string());
        permissions.push(format_permission(Resources::STAFF, Actions::MANAGE));
    }
    (roles, permissions)
}
