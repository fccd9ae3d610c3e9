//! CLI subcommands and their handlers.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::api::{ApiClient, Submission, WishlistOutcome};
use crate::cache::{
  classify, NoopCache, Request, ResponseCache, RouteClass, RouteDecision, Router, SqliteCache,
  StrategyExecutor,
};
use crate::config::Config;
use crate::controller::Controller;
use crate::event::EventHandler;
use crate::push::{resolve_navigation, PushPayload};
use crate::store::{CartEntry, OfflineStore, ProductSnapshot};
use crate::sync::Reconciler;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Watch connectivity and sync pending writes automatically
  Watch,
  /// Run one reconciliation pass now
  Sync,
  /// Fetch a URL through the cache router and strategies
  Fetch {
    /// Absolute URL or a path on the configured storefront
    url: String,
    /// Print the response body to stdout
    #[arg(long)]
    body: bool,
  },
  /// Cart operations; mutations are recorded locally when offline
  #[command(subcommand)]
  Cart(CartCommand),
  /// Submit an order payload, queueing it locally if the network fails
  Order {
    /// Path to the order payload JSON
    file: PathBuf,
  },
  /// Toggle a product on the wishlist
  Wishlist { store_product_id: i64 },
  /// Search autocomplete suggestions
  Search { query: String },
  /// Apply catalog filters and print the rendered product grid
  Filter {
    /// Filter map as JSON, e.g. '{"category": "beef"}'
    filters: String,
  },
  /// Locally cached product snapshots for offline browsing
  #[command(subcommand)]
  Products(ProductsCommand),
  /// Stored preferences (zip code, preferred store, ...)
  #[command(subcommand)]
  Prefs(PrefsCommand),
  /// Push notification helpers
  #[command(subcommand)]
  Push(PushCommand),
  /// Show pending sync state and connectivity
  Status,
}

#[derive(Subcommand, Debug)]
pub enum CartCommand {
  /// Add a product to the cart (falls back to the local snapshot offline)
  Add {
    store_product_id: i64,
    #[arg(default_value_t = 1)]
    quantity: u32,
  },
  /// Set a product's quantity in the local snapshot (0 removes it);
  /// synced as one batch on the next reconciliation
  Set { store_product_id: i64, quantity: u32 },
  /// Update a server-side cart line
  Update { cart_item_id: i64, quantity: u32 },
  /// Remove a server-side cart line
  Remove { cart_item_id: i64 },
  /// Show the locally recorded snapshot
  Show,
}

#[derive(Subcommand, Debug)]
pub enum ProductsCommand {
  /// Import product snapshots from a JSON array file
  Import { file: PathBuf },
  /// List cached products, optionally narrowed by category or store
  List {
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    store: Option<String>,
  },
  /// Show one cached product as JSON
  Show { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
  Set { key: String, value: String },
  Get { key: String },
}

#[derive(Subcommand, Debug)]
pub enum PushCommand {
  /// Print the server's VAPID public key
  VapidKey,
  /// Register a push subscription from a JSON file
  Subscribe { file: PathBuf },
  /// Resolve a push payload file to its navigation target
  Route { file: PathBuf },
}

pub async fn run(command: Command, config: &Config) -> Result<()> {
  match command {
    Command::Watch => watch(config).await,
    Command::Sync => sync_once(config).await,
    Command::Fetch { url, body } => fetch(config, &url, body).await,
    Command::Cart(cmd) => cart(config, cmd).await,
    Command::Order { file } => order(config, &file).await,
    Command::Wishlist { store_product_id } => wishlist(config, store_product_id).await,
    Command::Search { query } => search(config, &query).await,
    Command::Filter { filters } => filter(config, &filters).await,
    Command::Products(cmd) => products(config, cmd),
    Command::Prefs(cmd) => prefs(config, cmd),
    Command::Push(cmd) => push(config, cmd).await,
    Command::Status => status(config).await,
  }
}

fn open_store(config: &Config) -> Result<Arc<OfflineStore>> {
  Ok(Arc::new(OfflineStore::open_in(&config.data_path()?)?))
}

/// Open the response cache and activate the configured generation, purging
/// whatever older generations are still on disk.
fn open_cache(config: &Config) -> Result<SqliteCache> {
  let cache = SqliteCache::open_in(&config.data_path()?, config.generation())?;
  let removed = cache.activate()?;
  if removed > 0 {
    info!(removed, generation = cache.generation(), "purged old cache generations");
  }
  Ok(cache)
}

async fn watch(config: &Config) -> Result<()> {
  let store = open_store(config)?;
  let api = ApiClient::new(config)?;
  let reconciler = Reconciler::new(Arc::clone(&store), api.clone());
  let mut controller = Controller::new(store, reconciler);
  controller.register_context("/");

  let probe_api = api.clone();
  let events = EventHandler::new(
    move || {
      let api = probe_api.clone();
      async move { api.probe().await }
    },
    config.probe_interval(),
    config.background_sync(),
  );

  println!(
    "watching {} (probe every {}s)",
    config.server.url,
    config.probe_interval().as_secs()
  );
  controller.run(events).await
}

async fn sync_once(config: &Config) -> Result<()> {
  let store = open_store(config)?;
  let api = ApiClient::new(config)?;
  let reconciler = Reconciler::new(store, api);

  let report = reconciler.drain().await?;
  if report.is_empty() {
    println!("nothing to sync");
  } else {
    for line in report.lines() {
      println!("{}", line);
    }
  }
  Ok(())
}

async fn fetch(config: &Config, input: &str, print_body: bool) -> Result<()> {
  let api = ApiClient::new(config)?;
  let url = resolve_url(api.origin(), input)?;

  // Page URLs are fetched as navigations so they get the offline page
  // instead of a bare 503 when everything fails.
  let request = if classify(url.path()) == RouteClass::Pages {
    Request::navigation(url)
  } else {
    Request::get(url)
  };

  let router = Router::new(api.origin().clone());
  let decision = router.route(&request);

  let fulfilled = if config.cache.enabled {
    let cache = Arc::new(open_cache(config)?);
    let executor = StrategyExecutor::new(cache).with_network_timeout(config.network_timeout());
    fetch_with(&executor, decision, &request, api).await?
  } else {
    let executor = StrategyExecutor::new(Arc::new(NoopCache::new(config.generation())));
    fetch_with(&executor, decision, &request, api).await?
  };

  let class = match decision {
    RouteDecision::Handle(class) => class.as_str(),
    RouteDecision::PassThrough => "pass-through",
  };
  eprintln!(
    "{} {} [{} via {}]",
    fulfilled.response.status,
    request.url,
    class,
    fulfilled.source.as_str()
  );

  if print_body {
    std::io::stdout().write_all(&fulfilled.response.body)?;
  }
  Ok(())
}

async fn fetch_with<C: ResponseCache + 'static>(
  executor: &StrategyExecutor<C>,
  decision: RouteDecision,
  request: &Request,
  api: ApiClient,
) -> Result<crate::cache::Fulfilled> {
  let fetcher = move |req: Request| async move { api.fetch_raw(req).await };

  match decision {
    RouteDecision::Handle(class) => Ok(executor.fulfil(class, request, fetcher).await),
    RouteDecision::PassThrough => executor.pass_through(request, fetcher).await,
  }
}

fn resolve_url(origin: &Url, input: &str) -> Result<Url> {
  if input.starts_with("http://") || input.starts_with("https://") {
    Url::parse(input).map_err(|e| eyre!("Invalid URL {}: {}", input, e))
  } else {
    origin
      .join(input)
      .map_err(|e| eyre!("Invalid path {}: {}", input, e))
  }
}

async fn cart(config: &Config, command: CartCommand) -> Result<()> {
  let store = open_store(config)?;
  let api = ApiClient::new(config)?;

  match command {
    CartCommand::Add {
      store_product_id,
      quantity,
    } => match api.add_to_cart(store_product_id, quantity).await {
      Ok(Some(count)) => println!("added - cart has {} item(s)", count),
      Ok(None) => println!("added"),
      Err(e) => {
        warn!("cart add failed, recording locally: {}", e);
        record_cart_mutation(&store, store_product_id, quantity)?;
        println!("offline - recorded locally, will sync on reconnect");
      }
    },
    CartCommand::Set {
      store_product_id,
      quantity,
    } => {
      record_cart_mutation(&store, store_product_id, quantity)?;
      println!("snapshot updated, will sync on the next pass");
    }
    CartCommand::Update {
      cart_item_id,
      quantity,
    } => {
      api.update_cart_item(cart_item_id, quantity).await?;
      println!("updated");
    }
    CartCommand::Remove { cart_item_id } => {
      api.remove_cart_item(cart_item_id).await?;
      println!("removed");
    }
    CartCommand::Show => {
      let entries = store.cart_entries()?;
      if entries.is_empty() {
        println!("local cart snapshot is empty");
      } else {
        for entry in entries {
          println!("{:>6} x{}", entry.store_product_id, entry.quantity);
        }
      }
    }
  }
  Ok(())
}

/// Apply one mutation to the local cart and record the full snapshot
/// wholesale - no per-item diffing.
fn record_cart_mutation(store: &OfflineStore, store_product_id: i64, quantity: u32) -> Result<()> {
  let mut entries = store.cart_entries()?;
  entries.retain(|e| e.store_product_id != store_product_id);
  if quantity > 0 {
    entries.push(CartEntry {
      store_product_id,
      quantity,
      metadata: None,
    });
  }
  store.replace_cart(&entries)
}

async fn order(config: &Config, file: &Path) -> Result<()> {
  let contents = std::fs::read_to_string(file)
    .map_err(|e| eyre!("Failed to read order file {}: {}", file.display(), e))?;
  let payload: serde_json::Value = serde_json::from_str(&contents)
    .map_err(|e| eyre!("Order file {} is not valid JSON: {}", file.display(), e))?;

  let api = ApiClient::new(config)?;
  match api.submit_order(&payload).await {
    Ok(Submission::Accepted) => println!("order submitted"),
    Ok(Submission::LoginRequired) => {
      println!("session expired - log in at the storefront and retry")
    }
    Err(e) => {
      warn!("order submission failed, queueing locally: {}", e);
      let store = open_store(config)?;
      let id = store.queue_order(&payload)?;
      println!("offline - order queued locally (#{}), will sync on reconnect", id);
    }
  }
  Ok(())
}

async fn wishlist(config: &Config, store_product_id: i64) -> Result<()> {
  let api = ApiClient::new(config)?;
  match api.toggle_wishlist(store_product_id).await? {
    WishlistOutcome::Added => println!("added to wishlist"),
    WishlistOutcome::Removed => println!("removed from wishlist"),
    WishlistOutcome::LoginRequired => println!("log in at the storefront to use the wishlist"),
  }
  Ok(())
}

async fn search(config: &Config, query: &str) -> Result<()> {
  let api = ApiClient::new(config)?;
  let suggestions = api.search_suggestions(query).await?;

  if suggestions.is_empty() {
    println!("no suggestions");
  }
  for suggestion in suggestions {
    match suggestion.category {
      Some(category) => println!("{} ({})", suggestion.name, category),
      None => println!("{}", suggestion.name),
    }
  }
  Ok(())
}

async fn filter(config: &Config, filters: &str) -> Result<()> {
  let filters: serde_json::Value =
    serde_json::from_str(filters).map_err(|e| eyre!("Filters are not valid JSON: {}", e))?;

  let api = ApiClient::new(config)?;
  let html = api.apply_filters(&filters).await?;
  println!("{}", html);
  Ok(())
}

fn products(config: &Config, command: ProductsCommand) -> Result<()> {
  let store = open_store(config)?;

  match command {
    ProductsCommand::Import { file } => {
      let contents = std::fs::read_to_string(&file)
        .map_err(|e| eyre!("Failed to read products file {}: {}", file.display(), e))?;
      let raw: Vec<serde_json::Value> = serde_json::from_str(&contents)
        .map_err(|e| eyre!("Products file is not a JSON array: {}", e))?;

      let snapshots: Vec<ProductSnapshot> = raw
        .into_iter()
        .filter_map(|value| {
          let id = value.get("id")?.as_i64()?;
          let name = value.get("name")?.as_str()?.to_string();
          Some(ProductSnapshot {
            id,
            name,
            category: value.get("category").and_then(|v| v.as_str()).map(String::from),
            store: value.get("store").and_then(|v| v.as_str()).map(String::from),
            data: value,
          })
        })
        .collect();

      let count = snapshots.len();
      store.put_products(&snapshots)?;
      println!("imported {} product(s)", count);
    }
    ProductsCommand::List { category, store: by_store } => {
      let snapshots = match (category, by_store) {
        (Some(category), _) => store.products_by_category(&category)?,
        (None, Some(by_store)) => store.products_by_store(&by_store)?,
        (None, None) => return Err(eyre!("pass --category or --store")),
      };

      if snapshots.is_empty() {
        println!("no cached products");
      }
      for snapshot in snapshots {
        println!("{:>6}  {}", snapshot.id, snapshot.name);
      }
    }
    ProductsCommand::Show { id } => match store.get_product(id)? {
      Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot.data)?),
      None => println!("product {} is not cached", id),
    },
  }
  Ok(())
}

fn prefs(config: &Config, command: PrefsCommand) -> Result<()> {
  let store = open_store(config)?;

  match command {
    PrefsCommand::Set { key, value } => {
      store.set_preference(&key, &value)?;
      println!("set {}", key);
    }
    PrefsCommand::Get { key } => match store.get_preference(&key)? {
      Some(value) => println!("{}", value),
      None => println!("(unset)"),
    },
  }
  Ok(())
}

async fn push(config: &Config, command: PushCommand) -> Result<()> {
  match command {
    PushCommand::VapidKey => {
      let api = ApiClient::new(config)?;
      println!("{}", api.vapid_key().await?);
    }
    PushCommand::Subscribe { file } => {
      let contents = std::fs::read_to_string(&file)
        .map_err(|e| eyre!("Failed to read subscription file {}: {}", file.display(), e))?;
      let subscription: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| eyre!("Subscription file is not valid JSON: {}", e))?;

      let api = ApiClient::new(config)?;
      api.subscribe_push(&subscription).await?;
      println!("subscribed");
    }
    PushCommand::Route { file } => {
      let contents = std::fs::read_to_string(&file)
        .map_err(|e| eyre!("Failed to read payload file {}: {}", file.display(), e))?;
      let payload: PushPayload = serde_json::from_str(&contents)
        .map_err(|e| eyre!("Payload file is not valid JSON: {}", e))?;

      let target = payload.navigation_target();
      match resolve_navigation(&[], &target) {
        crate::push::NavigationAction::Open(url) | crate::push::NavigationAction::Focus(url) => {
          println!("{}", url)
        }
      }
    }
  }
  Ok(())
}

async fn status(config: &Config) -> Result<()> {
  let store = open_store(config)?;
  let api = ApiClient::new(config)?;
  let online = api.probe().await;

  println!(
    "server:         {} ({})",
    config.server.url,
    if online { "online" } else { "offline" }
  );
  println!("generation:     {}", config.generation());
  println!("pending orders: {}", store.pending_order_count()?);
  println!("cart snapshot:  {} item(s)", store.cart_entries()?.len());
  Ok(())
}
