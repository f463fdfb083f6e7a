use crate::error::{CartRankError, Result};
use crate::models::*;

pub const MAX_CART_SIZE: usize = 10_000;

pub fn validate_raw_event(event: &RawEvent) -> Result<()> {
    if event.timestamp < 0 {
        return Err(CartRankError::Data(format!(
            "event for visitor {} item {} has negative timestamp {}",
            event.visitor_id, event.item_id, event.timestamp
        )));
    }
    Ok(())
}

pub fn validate_cart_item(item: &CartItem) -> Result<()> {
    if !item.days_in_cart.is_finite() {
        return Err(CartRankError::Data(format!(
            "cart item {} has non-finite days_in_cart",
            item.item_id
        )));
    }

    if item.days_in_cart < 0.0 {
        return Err(CartRankError::Data(format!(
            "cart item {} has negative days_in_cart {}",
            item.item_id, item.days_in_cart
        )));
    }

    Ok(())
}

pub fn validate_cart(cart: &[CartItem]) -> Result<()> {
    if cart.len() > MAX_CART_SIZE {
        return Err(CartRankError::Data(format!(
            "cart too large: {} items (max {})",
            cart.len(),
            MAX_CART_SIZE
        )));
    }

    cart.iter().try_for_each(validate_cart_item)
}

pub fn validate_labeled_row(row: &LabeledRow) -> Result<()> {
    if row.label > 1 {
        return Err(CartRankError::Data(format!(
            "row for visitor {} item {} has label {}",
            row.visitor_id, row.item_id, row.label
        )));
    }

    if !row.days_in_cart.is_finite() || row.days_in_cart < 0.0 {
        return Err(CartRankError::Data(format!(
            "row for visitor {} item {} has invalid days_in_cart",
            row.visitor_id, row.item_id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_raw_event() {
        assert!(validate_raw_event(&RawEvent::new(1, 2, EventKind::View, 1_433_221_332_117)).is_ok());
        assert!(validate_raw_event(&RawEvent::new(1, 2, EventKind::View, -5)).is_err());
    }

    #[test]
    fn test_validate_cart() {
        let good = CartItem::new(1, 2, 1, 0.5, 3);
        assert!(validate_cart(&[good.clone()]).is_ok());

        let nan = CartItem::new(2, 0, 0, f64::NAN, 0);
        assert!(matches!(validate_cart(&[good, nan]), Err(CartRankError::Data(_))));
        assert!(validate_cart_item(&CartItem::new(3, 0, 0, -1.0, 0)).is_err());
    }

    #[test]
    fn test_validate_labeled_row() {
        let row = LabeledRow {
            visitor_id: 1,
            item_id: 2,
            view_count: 1,
            add_count: 0,
            days_in_cart: 3.0,
            unique_views: 1,
            label: 1,
        };
        assert!(validate_labeled_row(&row).is_ok());
        assert!(validate_labeled_row(&LabeledRow { label: 2, ..row.clone() }).is_err());
        assert!(validate_labeled_row(&LabeledRow {
            days_in_cart: f64::INFINITY,
            ..row
        })
        .is_err());
    }
}
