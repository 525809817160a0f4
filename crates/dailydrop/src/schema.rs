// Diesel table definitions. Kept in sync with `repository/schema_sqlite.sql`.

diesel::table! {
    post_configs (storage_key) {
        storage_key -> Text,
        content_slug -> Nullable<Text>,
        post_id -> Nullable<BigInt>,
        document -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    post_fingerprints (post_ref, run_date, target, fingerprint) {
        post_ref -> Text,
        run_date -> Text,
        target -> Text,
        fingerprint -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    source_monitoring (id) {
        id -> Integer,
        post_ref -> Text,
        source_url -> Text,
        extractor -> Text,
        date -> Text,
        items_found -> Integer,
        confidence -> Float,
        success -> Bool,
        error -> Nullable<Text>,
        recorded_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(post_configs, post_fingerprints, source_monitoring);
