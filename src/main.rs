use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPool;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pantry::config::AppConfig;
use pantry::db;
use pantry::llm::{GuardedModel, OpenAiChatClient};
use pantry::model::{IngredientInput, UserId};
use pantry::pantry::PantryService;

#[derive(Parser)]
#[command(
    name = "pantry",
    about = "Ingredient reconciliation and cookability tracking",
    long_about = "Reconcile raw ingredient entries against the catalog, update user stock and keep the cookable recipe set current"
)]
struct Cli {
    /// Database URL override
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    InitDb,
    /// Add a catalog ingredient or change its canonical unit
    AddIngredient {
        name: String,
        unit: String,
    },
    /// Reconcile entries without touching stock
    Reconcile {
        #[command(flatten)]
        entries: EntryArgs,
    },
    /// Add entries to a user's stock
    Restock {
        #[arg(long)]
        user: UserId,
        #[command(flatten)]
        entries: EntryArgs,
    },
    /// Subtract entries from a user's stock
    Consume {
        #[arg(long)]
        user: UserId,
        #[command(flatten)]
        entries: EntryArgs,
    },
    /// Subtract a recipe's requirements from a user's stock
    Cook {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        recipe: i32,
    },
    /// Set the stock of one ingredient to an absolute amount
    SetStock {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        ingredient: i32,
        #[arg(long)]
        amount: f64,
    },
    /// Recompute a user's cookable recipes from scratch
    Recompute {
        #[arg(long)]
        user: UserId,
    },
    /// List a user's cookable recipes
    Cookable {
        #[arg(long)]
        user: UserId,
        /// Only recipes of this dish type
        #[arg(long)]
        dish_type: Option<String>,
    },
    /// Show a recipe with its ingredients and steps
    Recipe {
        #[arg(long)]
        id: i32,
    },
    /// List dish types
    DishTypes,
}

#[derive(clap::Args)]
struct EntryArgs {
    /// Entry as `NAME=QUANTITY`, e.g. `--item "roma tomatoes=2 kg"`
    #[arg(long = "item", value_parser = parse_item)]
    items: Vec<IngredientInput>,

    /// JSON file holding an array of `{"ingredient", "quantity"}` objects
    #[arg(long)]
    file: Option<PathBuf>,
}

impl EntryArgs {
    fn load(self) -> Result<Vec<IngredientInput>> {
        let mut inputs = self.items;
        if let Some(path) = self.file {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let from_file: Vec<IngredientInput> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            inputs.extend(from_file);
        }
        if inputs.is_empty() {
            return Err(anyhow!("No entries given; use --item or --file"));
        }
        Ok(inputs)
    }
}

fn parse_item(raw: &str) -> Result<IngredientInput, String> {
    let (name, quantity) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=QUANTITY, got '{raw}'"))?;
    Ok(IngredientInput::new(name.trim(), quantity.trim()))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    let database_url = cli.database_url.clone();
    let config = AppConfig::from_lookup(|key| match (key, &database_url) {
        ("DATABASE_URL", Some(url)) => Some(url.clone()),
        _ => env::var(key).ok(),
    })?;

    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let model = GuardedModel::new(
        OpenAiChatClient::new(config.llm.clone()),
        config.llm.recovery.clone(),
    );
    let service = PantryService::new(pool, Arc::new(model), config.pipeline.clone());

    match cli.command {
        Command::InitDb => {
            db::init_database_schema(service.pool()).await?;
            info!("Schema ready");
        }
        Command::AddIngredient { name, unit } => {
            let id = service.upsert_catalog_entry(&name, &unit).await?;
            print_json(&serde_json::json!({ "ingredient_id": id, "name": name, "unit": unit }))?;
        }
        Command::Reconcile { entries } => {
            let report = service.reconcile(&entries.load()?).await?;
            print_json(&report)?;
        }
        Command::Restock { user, entries } => {
            print_json(&service.restock(user, &entries.load()?).await?)?;
        }
        Command::Consume { user, entries } => {
            print_json(&service.consume_ingredients(user, &entries.load()?).await?)?;
        }
        Command::Cook { user, recipe } => {
            print_json(&service.cook_recipe(user, recipe).await?)?;
        }
        Command::SetStock {
            user,
            ingredient,
            amount,
        } => {
            print_json(&service.set_stock(user, ingredient, amount).await?)?;
        }
        Command::Recompute { user } => {
            print_json(&service.recompute(user).await?)?;
        }
        Command::Cookable { user, dish_type } => {
            print_json(&service.cookable_recipes(user, dish_type.as_deref()).await?)?;
        }
        Command::Recipe { id } => {
            let detail = service
                .recipe_detail(id)
                .await?
                .ok_or_else(|| anyhow!("Recipe {id} not found"))?;
            print_json(&detail)?;
        }
        Command::DishTypes => {
            print_json(&service.dish_types().await?)?;
        }
    }

    Ok(())
}
