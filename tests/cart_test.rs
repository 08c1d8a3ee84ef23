mod common;

use rust_decimal_macros::dec;
use uuid::Uuid;

use storefront_api::errors::ServiceError;

use common::{seed_product, setup};

#[tokio::test]
async fn empty_cart_is_created_on_first_read() {
    let app = setup().await;
    let detail = app
        .services
        .carts
        .get_cart_detail(Uuid::new_v4())
        .await
        .unwrap();
    assert!(detail.items.is_empty());
    assert_eq!(detail.total, dec!(0));
}

#[tokio::test]
async fn adding_the_same_product_merges_the_line() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let product = seed_product(&app.db, "Keyboard", dec!(100000), 10).await;

    app.services
        .carts
        .add_item(user_id, product.id, 2)
        .await
        .unwrap();
    let detail = app
        .services
        .carts
        .add_item(user_id, product.id, 3)
        .await
        .unwrap();

    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].quantity, 5);
    assert_eq!(detail.items[0].line_total, dec!(500000));
    assert_eq!(detail.total, dec!(500000));
}

#[tokio::test]
async fn cart_is_priced_from_the_live_catalog() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let keyboard = seed_product(&app.db, "Keyboard", dec!(100000), 10).await;
    let mouse = seed_product(&app.db, "Mouse", dec!(50000), 10).await;

    app.services
        .carts
        .add_item(user_id, keyboard.id, 1)
        .await
        .unwrap();
    let detail = app
        .services
        .carts
        .add_item(user_id, mouse.id, 2)
        .await
        .unwrap();

    assert_eq!(detail.items.len(), 2);
    assert_eq!(detail.total, dec!(200000));
}

#[tokio::test]
async fn adding_an_unknown_product_is_not_found() {
    let app = setup().await;
    let err = app
        .services
        .carts
        .add_item(Uuid::new_v4(), Uuid::new_v4(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let app = setup().await;
    let product = seed_product(&app.db, "Cable", dec!(20000), 10).await;
    let err = app
        .services
        .carts
        .add_item(Uuid::new_v4(), product.id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn update_replaces_quantity_and_remove_deletes_the_line() {
    let app = setup().await;
    let user_id = Uuid::new_v4();
    let product = seed_product(&app.db, "Monitor", dec!(3000000), 10).await;

    app.services
        .carts
        .add_item(user_id, product.id, 4)
        .await
        .unwrap();

    let detail = app
        .services
        .carts
        .update_item_quantity(user_id, product.id, 1)
        .await
        .unwrap();
    assert_eq!(detail.items[0].quantity, 1);

    let detail = app
        .services
        .carts
        .remove_item(user_id, product.id)
        .await
        .unwrap();
    assert!(detail.items.is_empty());
}

#[tokio::test]
async fn updating_a_line_that_does_not_exist_is_not_found() {
    let app = setup().await;
    let product = seed_product(&app.db, "Stand", dec!(150000), 10).await;
    let err = app
        .services
        .carts
        .update_item_quantity(Uuid::new_v4(), product.id, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
