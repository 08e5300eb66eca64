use super::{BeneficiaryCommand, Cli, Command, CounterCommand, EventCommand, ExpenseCommand};
use anyhow::{Context, Result};
use chrono::Utc;
use tabkeeper::{Entity, EntityId, Expense, StoreConfig, Tabkeeper, UserId};

pub async fn run(cli: Cli) -> Result<()> {
    let config = StoreConfig::new(&cli.data_dir).flush_interval_secs(cli.flush_interval);
    let store = Tabkeeper::open(config)
        .await
        .with_context(|| format!("Failed to open store in '{}'", cli.data_dir.display()))?;

    // Flush even when the command failed.
    let result = execute(&store, cli.command);
    store.close().await.context("Failed to flush store")?;
    result
}

fn execute(store: &Tabkeeper, command: Command) -> Result<()> {
    match command {
        Command::Expense { action } => expense(store, action),
        Command::Beneficiary { action } => beneficiary(store, action),
        Command::Settle => {
            let outcome = store.ledger().calculate_settlement()?;
            if outcome.is_empty() {
                println!("Nothing to settle");
                return Ok(());
            }
            println!("Settled {} expense(s)", outcome.processed);
            if outcome.debts.is_empty() {
                println!("Everyone is even");
            }
            for debt in &outcome.debts {
                println!("{}", debt);
            }
            Ok(())
        }
        Command::Debts { user } => {
            let debts = match user {
                Some(user) => store.ledger().debts_for(UserId(user))?,
                None => store
                    .ledger()
                    .debts()?
                    .into_iter()
                    .filter(|debt| !debt.is_paid())
                    .collect(),
            };
            if debts.is_empty() {
                println!("No open debts");
            }
            for debt in &debts {
                println!("{}", debt);
            }
            Ok(())
        }
        Command::Pay { debt, caller } => {
            let outcome = store
                .ledger()
                .mark_debt_paid(EntityId(debt), UserId(caller))?;
            println!("{}", outcome.describe());
            Ok(())
        }
        Command::Counter { action } => counter(store, action),
        Command::Event { action } => event(store, action),
    }
}

fn print_expense(expense: &Expense) {
    let beneficiaries: Vec<String> = expense
        .beneficiaries()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!(
        "#{} {} {:.2} paid by {} for [{}]{}",
        expense.id(),
        expense.name(),
        expense.amount(),
        expense.payer(),
        beneficiaries.join(", "),
        if expense.is_settled() { " (settled)" } else { "" }
    );
}

fn expense(store: &Tabkeeper, action: ExpenseCommand) -> Result<()> {
    let ledger = store.ledger();
    match action {
        ExpenseCommand::Add {
            name,
            amount,
            payer,
            beneficiaries,
        } => {
            let expense = ledger.create_expense(
                &name,
                amount,
                UserId(payer),
                beneficiaries.into_iter().map(UserId),
            )?;
            print_expense(&expense);
        }
        ExpenseCommand::List { unsettled } => {
            let expenses = if unsettled {
                ledger.unsettled_expenses()?
            } else {
                ledger.expenses()?
            };
            for expense in &expenses {
                print_expense(expense);
            }
        }
        ExpenseCommand::Rename { id, name } => {
            print_expense(&ledger.rename_expense(EntityId(id), &name)?);
        }
        ExpenseCommand::Amount { id, amount } => {
            print_expense(&ledger.set_amount(EntityId(id), amount)?);
        }
        ExpenseCommand::Rm { id } => {
            let removed = ledger.delete_expense(EntityId(id))?;
            println!("Deleted expense #{} '{}'", id, removed.name());
        }
    }
    Ok(())
}

fn beneficiary(store: &Tabkeeper, action: BeneficiaryCommand) -> Result<()> {
    let ledger = store.ledger();
    match action {
        BeneficiaryCommand::Add { expense, user } => {
            if ledger.add_beneficiary(EntityId(expense), UserId(user))? {
                println!("Added {} to expense #{}", user, expense);
            } else {
                println!("{} already shares expense #{}", user, expense);
            }
        }
        BeneficiaryCommand::Rm { expense, user } => {
            if ledger.remove_beneficiary(EntityId(expense), UserId(user))? {
                println!("Removed {} from expense #{}", user, expense);
            } else {
                println!("{} does not share expense #{}", user, expense);
            }
        }
    }
    Ok(())
}

fn counter(store: &Tabkeeper, action: CounterCommand) -> Result<()> {
    match action {
        CounterCommand::Incr { name, by } => {
            println!("{} = {}", name, store.increment_counter(&name, by)?);
        }
        CounterCommand::Get { name } => {
            println!("{} = {}", name, store.counters().get(&name)?);
        }
        CounterCommand::Reset { name } => match store.reset_counter(&name)? {
            Some(previous) => println!("{} reset (was {})", name, previous),
            None => println!("{} was not set", name),
        },
        CounterCommand::List => {
            for (name, value) in store.counters().snapshot()? {
                println!("{} = {}", name, value);
            }
        }
    }
    Ok(())
}

fn event(store: &Tabkeeper, action: EventCommand) -> Result<()> {
    let events = store.events();
    match action {
        EventCommand::Add {
            title,
            at,
            organizer,
        } => {
            let event = events.create_event(&title, at, UserId(organizer))?;
            println!(
                "#{} {} at {}",
                event.id(),
                event.title(),
                event.starts_at().to_rfc3339()
            );
        }
        EventCommand::Join { id, user } => {
            let joined = events.join(EntityId(id), UserId(user))?;
            println!(
                "{}",
                if joined { "Joined" } else { "Already attending" }
            );
        }
        EventCommand::Leave { id, user } => {
            let left = events.leave(EntityId(id), UserId(user))?;
            println!("{}", if left { "Left" } else { "Was not attending" });
        }
        EventCommand::Cancel { id, caller } => {
            let event = events.cancel(EntityId(id), UserId(caller))?;
            println!("Cancelled '{}'", event.title());
        }
        EventCommand::List => {
            for event in events.upcoming(Utc::now())? {
                println!(
                    "#{} {} at {} ({} attending)",
                    event.id(),
                    event.title(),
                    event.starts_at().to_rfc3339(),
                    event.attendees().len()
                );
            }
        }
    }
    Ok(())
}
