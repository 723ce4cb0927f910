diesel::table! {
    orders (id) {
        id -> Int4,
        order_number -> Varchar,
        user_id -> Uuid,
        customer_email -> Nullable<Varchar>,
        status -> Varchar,
        shipped_at -> Nullable<Timestamptz>,
        delivered_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    addresses (id) {
        id -> Uuid,
        user_id -> Uuid,
        recipient_name -> Varchar,
        line1 -> Varchar,
        line2 -> Nullable<Varchar>,
        city -> Varchar,
        region -> Nullable<Varchar>,
        postal_code -> Varchar,
        country -> Varchar,
        phone -> Nullable<Varchar>,
        is_default -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

// Created lazily by the delivery sweeper, not by migrations.
diesel::table! {
    auto_delivery_log (id) {
        id -> Int8,
        order_id -> Int4,
        order_number -> Varchar,
        customer_email -> Nullable<Varchar>,
        processed_at -> Timestamptz,
    }
}

diesel::table! {
    auto_delivery_errors (id) {
        id -> Int8,
        order_id -> Nullable<Int4>,
        order_number -> Nullable<Varchar>,
        message -> Text,
        occurred_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    orders,
    addresses,
    auto_delivery_log,
    auto_delivery_errors,
);
