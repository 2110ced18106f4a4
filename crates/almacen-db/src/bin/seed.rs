//! # Seed Data Generator
//!
//! Populates the database with a demo catalog for development.
//!
//! ## Usage
//! ```bash
//! # Seed the database named in almacen.toml (or the platform default)
//! cargo run -p almacen-db --bin seed
//!
//! # Specify database path
//! cargo run -p almacen-db --bin seed -- --db ./data/almacen.db
//!
//! # Also ring up a few demo sales (cash, fiado, fiado with upfront)
//! cargo run -p almacen-db --bin seed -- --with-sales
//! ```
//!
//! ## Generated Products
//! - Unit products (alfajores, gaseosas) with loose stock
//! - Package products (yerba, galletitas) with loose units and sealed packages
//! - Weight products (queso, fiambre) with stock in kg

use std::env;
use std::path::PathBuf;

use almacen_core::{CartLine, MeasureUnit, PaymentIntent, Quantity};
use almacen_db::{AlmacenConfig, Database, NewProduct};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// `(name, stock_units)`
const UNIT_PRODUCTS: &[(&str, i64)] = &[
    ("Alfajor de maicena", 48),
    ("Gaseosa cola 500ml", 36),
    ("Agua mineral 1.5L", 24),
    ("Chicle menta", 120),
    ("Pan lactal", 12),
];

/// `(name, units_per_package, stock_units, stock_packages)`
const PACKAGE_PRODUCTS: &[(&str, i64, i64, i64)] = &[
    ("Yerba mate 500g", 12, 3, 2),
    ("Galletitas de agua", 20, 5, 3),
    ("Fideos tirabuzón", 10, 0, 6),
    ("Cigarrillos box 20", 10, 4, 10),
];

/// `(name, stock_grams)`
const WEIGHT_PRODUCTS: &[(&str, i64)] = &[
    ("Queso cremoso", 4_500),
    ("Jamón cocido", 2_250),
    ("Salame milán", 1_800),
    ("Aceitunas verdes", 3_000),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path: Option<PathBuf> = None;
    let mut with_sales = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--with-sales" => with_sales = true,
            "--help" | "-h" => {
                println!("Almacén Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: from almacen.toml)");
                println!("      --with-sales   Ring up demo cash and fiado sales");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = AlmacenConfig::load(None)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }
    let db_config = config.to_db_config()?;

    info!(path = %db_config.database_path.display(), "Seeding database");
    let db = Database::new(db_config).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products; skipping seed");
        return Ok(());
    }

    let mut created = Vec::new();

    for (name, stock) in UNIT_PRODUCTS {
        created.push(db.products().create(NewProduct::unit(*name, *stock)).await?);
    }
    for (name, per_package, units, packages) in PACKAGE_PRODUCTS {
        created.push(
            db.products()
                .create(NewProduct::package(*name, *per_package, *units, *packages))
                .await?,
        );
    }
    for (name, grams) in WEIGHT_PRODUCTS {
        created.push(
            db.products()
                .create(NewProduct::weight(*name, Quantity::from_thousandths(*grams)))
                .await?,
        );
    }

    info!(products = created.len(), "Catalog created");

    if with_sales {
        seed_sales(&db, &created).await?;
    }

    info!("Seed complete");
    Ok(())
}

/// Rings up one sale of each payment kind against the demo catalog.
async fn seed_sales(
    db: &Database,
    products: &[almacen_core::Product],
) -> Result<(), Box<dyn std::error::Error>> {
    let first_package = UNIT_PRODUCTS.len();
    let first_weight = first_package + PACKAGE_PRODUCTS.len();
    let (Some(alfajor), Some(pan), Some(yerba), Some(queso)) = (
        products.first(),
        products.get(first_package - 1),
        products.get(first_package),
        products.get(first_weight),
    ) else {
        return Ok(());
    };

    let cash = [
        CartLine::new(&alfajor.id, MeasureUnit::Unit, Quantity::from_whole(3), 450),
        CartLine::new(&yerba.id, MeasureUnit::Unit, Quantity::from_whole(10), 2_900),
    ];
    let receipt = db.checkout().checkout(&cash, &PaymentIntent::cash()).await?;
    info!(sale_number = receipt.sale.sale_number, "Cash sale");

    let fiado = [CartLine::new(
        &queso.id,
        MeasureUnit::Kilogram,
        Quantity::from_thousandths(750),
        12_000,
    )];
    let receipt = db
        .checkout()
        .checkout(&fiado, &PaymentIntent::fiado("cliente-demo"))
        .await?;
    info!(sale_number = receipt.sale.sale_number, "Fiado sale");

    let upfront = [CartLine::new(&pan.id, MeasureUnit::Unit, Quantity::from_whole(2), 1_800)];
    let receipt = db
        .checkout()
        .checkout(&upfront, &PaymentIntent::fiado_with_upfront("cliente-demo", 1_000))
        .await?;
    info!(sale_number = receipt.sale.sale_number, "Fiado sale with upfront payment");

    Ok(())
}

/// Installs the fmt subscriber, honouring `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,almacen=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
