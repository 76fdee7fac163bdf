use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::{CompanyId, DealStatus, DealType, UserId},
    protocol::{DealFilters, NewDeal},
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/crm.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateUser {
        name: String,
        email: String,
    },
    CreateCompany {
        name: String,
        #[arg(long, default_value = "")]
        industry: String,
    },
    CreateDeal {
        user_id: i64,
        company_id: i64,
        title: String,
        value: f64,
        #[arg(long, default_value = "in_progress")]
        status: DealStatus,
        #[arg(long)]
        agency: bool,
    },
    /// Three users' worth of sample deals spread over every column.
    Seed,
    ListDeals {
        #[arg(long)]
        status: Option<DealStatus>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;

    match cli.command {
        Command::CreateUser { name, email } => {
            let user_id = storage.create_user(&name, &email).await?;
            println!("created user_id={}", user_id.0);
        }
        Command::CreateCompany { name, industry } => {
            let company_id = storage.create_company(&name, &industry).await?;
            println!("created company_id={}", company_id.0);
        }
        Command::CreateDeal {
            user_id,
            company_id,
            title,
            value,
            status,
            agency,
        } => {
            let deal_id = storage
                .create_deal(&NewDeal {
                    title,
                    value,
                    status,
                    deal_type: if agency {
                        DealType::Agency
                    } else {
                        DealType::Direct
                    },
                    user_id: UserId(user_id),
                    company_id: CompanyId(company_id),
                    lead_source: None,
                    product_name: None,
                })
                .await?;
            println!("created deal_id={}", deal_id.0);
        }
        Command::Seed => seed(&storage).await?,
        Command::ListDeals { status } => {
            let deals = storage
                .list_deals(&DealFilters {
                    status,
                    ..DealFilters::default()
                })
                .await?;
            for deal in deals {
                println!(
                    "{}\t{}\t{}\t{}",
                    deal.id.0, deal.status, deal.value, deal.title
                );
            }
        }
    }

    Ok(())
}

async fn seed(storage: &Storage) -> Result<()> {
    let users = [
        ("Sato Hanako", "sato@example.com"),
        ("Suzuki Ichiro", "suzuki@example.com"),
        ("Takahashi Yui", "takahashi@example.com"),
    ];
    let companies = [
        ("Acme Trading", "Retail"),
        ("Kanto Logistics", "Logistics"),
        ("Blue Harbor Foods", "Food"),
    ];

    let mut user_ids = Vec::new();
    for (name, email) in users {
        user_ids.push(storage.create_user(name, email).await?);
    }
    let mut company_ids = Vec::new();
    for (name, industry) in companies {
        company_ids.push(storage.create_company(name, industry).await?);
    }

    let mut created = 0;
    for (i, status) in DealStatus::ALL.into_iter().cycle().take(10).enumerate() {
        storage
            .create_deal(&NewDeal {
                title: format!("Sample deal {}", i + 1),
                value: 250_000.0 * (i as f64 + 1.0),
                status,
                deal_type: if i % 3 == 0 {
                    DealType::Agency
                } else {
                    DealType::Direct
                },
                user_id: user_ids[i % user_ids.len()],
                company_id: company_ids[i % company_ids.len()],
                lead_source: Some("seed".to_string()),
                product_name: None,
            })
            .await?;
        created += 1;
    }
    println!(
        "seeded users={} companies={} deals={created}",
        user_ids.len(),
        company_ids.len()
    );
    Ok(())
}
