//! Capability checks for sale access: a caller may act on a sale when they
//! are the owning seller or hold an elevated role.

pub const ROLE_ADMIN: &str = "admin";

pub fn is_elevated(role: &str) -> bool {
    role == ROLE_ADMIN
}

pub fn can_manage_sale(caller_id: i64, role: &str, owner_seller_id: i64) -> bool {
    caller_id == owner_seller_id || is_elevated(role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_can_manage_own_sale() {
        assert!(can_manage_sale(7, "seller", 7));
    }

    #[test]
    fn other_seller_is_denied() {
        assert!(!can_manage_sale(8, "seller", 7));
    }

    #[test]
    fn admin_can_manage_any_sale() {
        assert!(can_manage_sale(99, "admin", 7));
        assert!(is_elevated("admin"));
        assert!(!is_elevated("seller"));
    }
}
