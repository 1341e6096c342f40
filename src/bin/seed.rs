use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use agrolink_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        categories::{ActiveModel as CategoryActive, Column as CategoryCol, Entity as Categories},
        products::{ActiveModel as ProductActive, Column as ProductCol, Entity as Products, ProductStatus},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, UserRole, UserStatus},
    },
};

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    price: Decimal,
    discount_price: Option<Decimal>,
    unit: &'static str,
    stock: i32,
    min_order_quantity: Option<i32>,
    shipping_cost: Option<Decimal>,
    sku: &'static str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url, 2).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_user(
        &orm,
        "admin@agrolink.ga",
        "admin123",
        "Admin",
        "Agrolink",
        UserRole::Admin,
        None,
    )
    .await?;
    let producer_id = ensure_user(
        &orm,
        "producteur@agrolink.ga",
        "producteur123",
        "Marie",
        "Ndong",
        UserRole::Producer,
        Some("Ferme Nkok"),
    )
    .await?;
    let consumer_id = ensure_user(
        &orm,
        "client@agrolink.ga",
        "client123",
        "Jean",
        "Obame",
        UserRole::Consumer,
        None,
    )
    .await?;

    let fruits = ensure_category(&orm, "Fruits", "fruits").await?;
    let legumes = ensure_category(&orm, "Légumes", "legumes").await?;
    let poisson = ensure_category(&orm, "Poisson", "poisson").await?;

    let catalog = [
        (
            fruits,
            SeedProduct {
                name: "Régime de bananes plantain",
                description: "Bananes plantain de la région de l'Estuaire",
                price: dec!(3500),
                discount_price: None,
                unit: "régime",
                stock: 120,
                min_order_quantity: None,
                shipping_cost: None,
                sku: "AGL-BAN-001",
            },
        ),
        (
            legumes,
            SeedProduct {
                name: "Bâtons de manioc",
                description: "Paquet de cinq bâtons",
                price: dec!(1500),
                discount_price: None,
                unit: "paquet",
                stock: 200,
                min_order_quantity: Some(2),
                shipping_cost: None,
                sku: "AGL-MAN-001",
            },
        ),
        (
            legumes,
            SeedProduct {
                name: "Piment fort",
                description: "Piment frais récolté à Ntoum",
                price: dec!(1000),
                discount_price: Some(dec!(800)),
                unit: "kg",
                stock: 80,
                min_order_quantity: None,
                shipping_cost: None,
                sku: "AGL-PIM-001",
            },
        ),
        (
            poisson,
            SeedProduct {
                name: "Poisson fumé",
                description: "Machoiron fumé, conditionné sous vide",
                price: dec!(6000),
                discount_price: None,
                unit: "kg",
                stock: 40,
                min_order_quantity: None,
                shipping_cost: Some(dec!(500)),
                sku: "AGL-POI-001",
            },
        ),
    ];

    for (category_id, product) in catalog {
        ensure_product(&orm, producer_id, category_id, product).await?;
    }

    println!("Seed completed. Admin: {admin_id}, Producer: {producer_id}, Consumer: {consumer_id}");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
    role: UserRole,
    business_name: Option<&str>,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(orm)
        .await?
    {
        println!("User {email} already present");
        return Ok(existing.id);
    }

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let now = Utc::now();
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(password_hash),
        first_name: Set(first_name.to_string()),
        last_name: Set(last_name.to_string()),
        phone: Set(None),
        role: Set(role),
        status: Set(UserStatus::Active),
        city: Set(Some("Libreville".to_string())),
        country: Set("Gabon".to_string()),
        business_name: Set(business_name.map(str::to_string)),
        province: Set(business_name.map(|_| "Estuaire".to_string())),
        production_types: Set(business_name.map(|_| serde_json::json!(["fruits", "légumes"]))),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(orm)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user.id)
}

async fn ensure_category(orm: &DatabaseConnection, name: &str, slug: &str) -> anyhow::Result<Uuid> {
    if let Some(existing) = Categories::find()
        .filter(CategoryCol::Slug.eq(slug))
        .one(orm)
        .await?
    {
        return Ok(existing.id);
    }

    let now = Utc::now();
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(slug.to_string()),
        description: Set(None),
        parent_id: Set(None),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(orm)
    .await?;

    println!("Ensured category {name}");
    Ok(category.id)
}

async fn ensure_product(
    orm: &DatabaseConnection,
    producer_id: Uuid,
    category_id: Uuid,
    product: SeedProduct,
) -> anyhow::Result<()> {
    if Products::find()
        .filter(ProductCol::Sku.eq(product.sku))
        .one(orm)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let now = Utc::now();
    ProductActive {
        id: Set(Uuid::new_v4()),
        producer_id: Set(producer_id),
        category_id: Set(category_id),
        name: Set(product.name.to_string()),
        description: Set(Some(product.description.to_string())),
        price: Set(product.price),
        discount_price: Set(product.discount_price),
        unit: Set(Some(product.unit.to_string())),
        stock: Set(product.stock),
        min_order_quantity: Set(product.min_order_quantity),
        shipping_cost: Set(product.shipping_cost),
        sku: Set(Some(product.sku.to_string())),
        image: Set(None),
        status: Set(ProductStatus::Active),
        sales_count: Set(0),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(orm)
    .await?;

    println!("Seeded product {}", product.name);
    Ok(())
}
