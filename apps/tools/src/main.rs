use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shared::domain::Customer;
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/scheduler.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database if needed and apply pending migrations.
    Migrate,
    /// Load the reference countries and first-level divisions.
    Seed,
    /// Create a user, or reset the password of an existing one.
    CreateUser { user_name: String, password: String },
    ListCountries,
    ListDivisions { country: String },
    ListCustomers {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Migrate => {
            storage.health_check().await?;
            println!("database ready at {}", cli.database_url);
        }
        Command::Seed => {
            let divisions = storage.seed_reference_data().await?;
            println!("seeded {divisions} divisions");
        }
        Command::CreateUser {
            user_name,
            password,
        } => {
            let user = storage.create_user(&user_name, &password).await?;
            println!("created user_id={} user_name={}", user.user_id, user.user_name);
        }
        Command::ListCountries => {
            for country in storage.list_countries().await? {
                println!("{}\t{}", country.country_id, country.name);
            }
        }
        Command::ListDivisions { country } => {
            let countries = storage.list_countries().await?;
            let Some(country) = countries
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&country))
            else {
                storage.rollback().await?;
                bail!("unknown country '{country}'");
            };
            for division in storage.list_divisions(country).await? {
                println!("{}\t{}", division.division_id, division.name);
            }
        }
        Command::ListCustomers { json } => {
            let customers = storage.list_customers().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&customers)?);
            } else {
                customers.iter().for_each(print_customer);
            }
        }
    }

    storage.commit().await?;
    Ok(())
}

fn print_customer(customer: &Customer) {
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}, {}",
        customer.customer_id,
        customer.customer_name,
        customer.address,
        customer.postal_code,
        customer.phone,
        customer.division,
        customer.country()
    );
}
