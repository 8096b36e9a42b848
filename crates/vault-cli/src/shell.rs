//! Interactive command loop

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;
use uuid::Uuid;
use vault_core::{
    generate_password, CategoryId, CategoryTree, ClipboardGuard, Credentials, EntryDraft, EntryId,
    GeneratorOptions, SearchQuery, SecretString, SessionController, SessionState,
    SettingsManager, VaultError,
};

use crate::command::{Command, HELP};
use crate::strength::HeuristicScorer;

/// Whether the loop keeps reading after a command
enum Flow {
    Continue,
    Exit,
}

pub struct Shell {
    session: Arc<SessionController>,
    clipboard: Arc<ClipboardGuard>,
    settings: SettingsManager,
    clipboard_ttl: Duration,
    email: Option<String>,
    input: Lines<BufReader<Stdin>>,
}

impl Shell {
    pub fn new(
        session: Arc<SessionController>,
        clipboard: Arc<ClipboardGuard>,
        settings: SettingsManager,
        clipboard_ttl: Duration,
        email: Option<String>,
    ) -> Self {
        Self {
            session,
            clipboard,
            settings,
            clipboard_ttl,
            email,
            input: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Sign in and unlock, then read commands until `quit`, `logout` or EOF
    pub async fn run(&mut self) -> Result<()> {
        self.sign_in().await?;
        self.unlock().await?;
        println!("Type 'help' for a list of commands.");

        loop {
            let prompt = format!("vault ({})> ", self.session.state());
            let Some(line) = self.read_line(&prompt).await? else {
                break;
            };

            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    eprintln!("{}", e);
                    continue;
                }
            };

            self.session.touch().await;
            match self.dispatch(command).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(e) => eprintln!("error: {}", e),
            }
        }

        if let Err(e) = self.clipboard.clear_now() {
            debug!("Clipboard not cleared on exit: {}", e);
        }
        Ok(())
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(Flow::Exit),
            Command::Logout => {
                self.session.logout().await;
                println!("Signed out.");
                return Ok(Flow::Exit);
            }
            Command::Lock => {
                self.session.lock().await;
                println!("Vault locked.");
            }
            Command::Unlock => {
                self.ensure_signed_in().await?;
                if self.session.state() == SessionState::Unlocked {
                    println!("Vault is already unlocked.");
                } else {
                    self.unlock().await?;
                }
            }
            Command::Generate(length) => self.generate(length)?,
            command => {
                self.ensure_unlocked().await?;
                self.dispatch_unlocked(command).await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn dispatch_unlocked(&mut self, command: Command) -> Result<()> {
        match command {
            Command::List => self.list(SearchQuery::all()).await,
            Command::Search { text, category } => {
                let mut query = SearchQuery::text(&text);
                if let Some(category) = category {
                    query = query.in_category(self.resolve_category(&category).await?);
                }
                self.list(query).await
            }
            Command::Show(id) => self.show(&id).await,
            Command::Add => self.add().await,
            Command::Edit(id) => self.edit(&id).await,
            Command::Remove(id) => self.remove(&id).await,
            Command::History(id) => self.history(&id).await,
            Command::Restore { entry, version } => {
                let id = self.resolve_entry(&entry).await?;
                self.session.restore_version(id, version).await?;
                println!("Restored version {}.", version);
                Ok(())
            }
            Command::Copy(id) => {
                let id = self.resolve_entry(&id).await?;
                let password = self.session.reveal_password(id).await?;
                self.clipboard.copy(&password, self.clipboard_ttl)?;
                println!(
                    "Password copied. The clipboard clears in {}s or when the vault locks.",
                    self.clipboard_ttl.as_secs()
                );
                Ok(())
            }
            Command::Categories => self.categories().await,
            Command::MakeCategory { name, parent } => {
                let parent = match parent {
                    Some(parent) => Some(self.resolve_category(&parent).await?),
                    None => None,
                };
                let (id, blob) = self.session.add_category(&name, parent).await?;
                self.session.save_categories(&[blob]).await?;
                println!("Created category {}.", short_id(id));
                Ok(())
            }
            Command::RenameCategory { category, name } => {
                let id = self.resolve_category(&category).await?;
                let blob = self.session.rename_category(id, &name).await?;
                self.session.save_categories(&[blob]).await?;
                Ok(())
            }
            Command::MoveCategory { category, parent } => {
                let id = self.resolve_category(&category).await?;
                let parent = match parent {
                    Some(parent) => Some(self.resolve_category(&parent).await?),
                    None => None,
                };
                let blob = self.session.move_category(id, parent).await?;
                self.session.save_categories(&[blob]).await?;
                Ok(())
            }
            Command::RemoveCategory(category) => {
                let id = self.resolve_category(&category).await?;
                let blobs = self.session.remove_category(id).await?;
                self.session.save_categories(&blobs).await?;
                println!("Category removed.");
                Ok(())
            }
            Command::ChangePassword => {
                let current = prompt_secret("Current master password: ").await?;
                let new = self.new_master_password().await?;
                self.session.change_master_password(current, new).await?;
                println!("Master password changed.");
                Ok(())
            }
            other => Err(anyhow!("{:?} cannot run here", other)),
        }
    }

    async fn sign_in(&mut self) -> Result<()> {
        let email = match self.email.clone() {
            Some(email) => email,
            None => {
                let remembered = self.settings.get().last_email.clone();
                self.ask("Email", remembered.as_deref()).await?
            }
        };
        if email.is_empty() {
            bail!("an email address is required");
        }

        let password = prompt_secret("Account password: ").await?;
        self.session
            .authenticate(&Credentials::new(&email, password))
            .await
            .context("Sign-in failed")?;

        if self.settings.get().remember_email {
            self.settings.remember_email(Some(&email)).await?;
        }
        self.email = Some(email);
        Ok(())
    }

    async fn ensure_signed_in(&mut self) -> Result<()> {
        match self.session.state() {
            SessionState::Anonymous | SessionState::Expired => {
                println!("Your session has ended, please sign in again.");
                self.sign_in().await
            }
            _ => Ok(()),
        }
    }

    async fn ensure_unlocked(&mut self) -> Result<()> {
        self.ensure_signed_in().await?;
        if self.session.state() != SessionState::Unlocked {
            self.unlock().await?;
        }
        Ok(())
    }

    async fn unlock(&mut self) -> Result<()> {
        let master = prompt_secret("Master password: ").await?;
        match self.session.unlock(master).await {
            Ok(report) => {
                println!("Vault unlocked, {} entries.", report.loaded);
                if !report.failed.is_empty() {
                    println!("{} items could not be decrypted:", report.failed.len());
                    for failure in &report.failed {
                        println!("  {} ({:?}): {}", failure.id, failure.kind, failure.reason);
                    }
                }
                Ok(())
            }
            Err(VaultError::VaultNotInitialized) => {
                if !self.confirm("No vault exists for this account yet. Create one?").await? {
                    bail!("vault not created");
                }
                let master = self.new_master_password().await?;
                self.session.initialize_vault(master).await?;
                println!("Vault created.");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn new_master_password(&mut self) -> Result<SecretString> {
        let first = prompt_secret("New master password: ").await?;
        if first.is_empty() {
            bail!("the master password must not be empty");
        }
        let strength = self.session.score_password(&HeuristicScorer, &first);
        println!("Strength: {}", strength.label);

        let second = prompt_secret("Repeat master password: ").await?;
        if first != second {
            bail!("passwords do not match");
        }
        Ok(first)
    }

    fn generate(&self, length: Option<usize>) -> Result<()> {
        let options = GeneratorOptions {
            length: length.unwrap_or(GeneratorOptions::default().length),
            ..GeneratorOptions::default()
        };
        let password = generate_password(&options)?;
        let strength = self.session.score_password(&HeuristicScorer, &password);
        println!("{}  ({})", password.expose(), strength.label);
        Ok(())
    }

    async fn list(&self, query: SearchQuery) -> Result<()> {
        let rows = self
            .session
            .with_store(|store| {
                store
                    .search(&query)
                    .map(|entry| {
                        format!(
                            "{}  {:<28} {:<28} {}",
                            short_id(entry.id),
                            entry.title,
                            entry.username,
                            category_label(store.categories(), entry.category)
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .await?;

        if rows.is_empty() {
            println!("No entries.");
        }
        for row in rows {
            println!("{}", row);
        }
        Ok(())
    }

    async fn show(&self, key: &str) -> Result<()> {
        let id = self.resolve_entry(key).await?;
        let text = self
            .session
            .with_store(|store| {
                store.get(id).map(|entry| {
                    format!(
                        "Title:    {}\nUsername: {}\nPassword: ********\nURL:      {}\nCategory: {}\nNotes:    {}\nCreated:  {}\nUpdated:  {}\nVersions: {}",
                        entry.title,
                        entry.username,
                        entry.url.as_deref().unwrap_or("-"),
                        category_label(store.categories(), entry.category),
                        entry.notes.as_deref().unwrap_or("-"),
                        entry.created_at.format("%Y-%m-%d %H:%M"),
                        entry.updated_at.format("%Y-%m-%d %H:%M"),
                        entry.history.len(),
                    )
                })
            })
            .await?
            .ok_or(VaultError::EntryNotFound(id))?;
        println!("{}", text);
        Ok(())
    }

    async fn add(&mut self) -> Result<()> {
        let title = self.ask("Title", None).await?;
        let username = self.ask("Username", None).await?;
        let mut draft = EntryDraft::new(&title, &username, "");
        draft.url = non_empty(self.ask("URL", None).await?);
        draft.notes = non_empty(self.ask("Notes", None).await?);
        let category = self.ask("Category", None).await?;
        if !category.is_empty() {
            draft.category = Some(self.resolve_category(&category).await?);
        }
        draft.password = self.entry_password("Password (blank to generate): ").await?;

        let id = self.session.save_entry(&draft).await?;
        println!("Saved entry {}.", short_id(id));
        Ok(())
    }

    async fn edit(&mut self, key: &str) -> Result<()> {
        let id = self.resolve_entry(key).await?;
        let mut draft = self
            .session
            .with_store(|store| store.get(id).map(|entry| entry.to_draft()))
            .await?
            .ok_or(VaultError::EntryNotFound(id))?;

        let current_title = draft.title.clone();
        draft.title = self.ask("Title", Some(current_title.as_str())).await?;
        let current_username = draft.username.clone();
        draft.username = self.ask("Username", Some(current_username.as_str())).await?;
        let current_url = draft.url.clone().unwrap_or_default();
        draft.url = non_empty(self.ask("URL", Some(current_url.as_str())).await?);

        if self.confirm("Change the password?").await? {
            draft.password = self.entry_password("New password (blank to generate): ").await?;
        }

        self.session.save_entry(&draft).await?;
        println!("Entry updated.");
        Ok(())
    }

    async fn remove(&mut self, key: &str) -> Result<()> {
        let id = self.resolve_entry(key).await?;
        if self.confirm("Delete this entry?").await? {
            self.session.remove_entry(id).await?;
            println!("Entry deleted.");
        }
        Ok(())
    }

    async fn history(&self, key: &str) -> Result<()> {
        let id = self.resolve_entry(key).await?;
        let versions = self.session.history(id).await?;
        if versions.is_empty() {
            println!("No earlier versions.");
        }
        for (index, version) in versions.iter().enumerate() {
            println!(
                "{:>3}  {}  {:<28} {}",
                index,
                version.recorded_at.format("%Y-%m-%d %H:%M"),
                version.title,
                version.username
            );
        }
        Ok(())
    }

    async fn categories(&self) -> Result<()> {
        let lines = self
            .session
            .with_store(|store| {
                let mut lines = Vec::new();
                tree_lines(store.categories(), None, 0, &mut lines);
                lines
            })
            .await?;

        if lines.is_empty() {
            println!("No categories.");
        }
        for line in lines {
            println!("{}", line);
        }
        Ok(())
    }

    async fn entry_password(&mut self, prompt: &'static str) -> Result<SecretString> {
        let typed = prompt_secret(prompt).await?;
        let password = if typed.is_empty() {
            let generated = generate_password(&GeneratorOptions::default())?;
            println!("Generated a {} character password.", generated.expose().chars().count());
            generated
        } else {
            typed
        };

        let strength = self.session.score_password(&HeuristicScorer, &password);
        println!("Strength: {}", strength.label);
        Ok(password)
    }

    async fn resolve_entry(&self, key: &str) -> Result<EntryId> {
        let candidates = self
            .session
            .with_store(|store| {
                store
                    .entries()
                    .map(|e| (e.id, e.title.clone()))
                    .collect::<Vec<_>>()
            })
            .await?;
        resolve(candidates, key, "entry")
    }

    async fn resolve_category(&self, key: &str) -> Result<CategoryId> {
        let candidates = self
            .session
            .with_store(|store| {
                store
                    .categories()
                    .iter()
                    .map(|c| (c.id, c.name.clone()))
                    .collect::<Vec<_>>()
            })
            .await?;
        resolve(candidates, key, "category")
    }

    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        Ok(self.input.next_line().await?)
    }

    /// Read a line, returning `default` for blank input
    async fn ask(&mut self, label: &str, default: Option<&str>) -> Result<String> {
        let prompt = match default {
            Some(value) if !value.is_empty() => format!("{} [{}]: ", label, value),
            _ => format!("{}: ", label),
        };
        let line = self
            .read_line(&prompt)
            .await?
            .ok_or_else(|| anyhow!("input closed"))?;

        let line = line.trim();
        Ok(match (line.is_empty(), default) {
            (true, Some(value)) => value.to_string(),
            _ => line.to_string(),
        })
    }

    async fn confirm(&mut self, question: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} [y/N]", question), None).await?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

/// Read a secret from the terminal without echo
async fn prompt_secret(prompt: &'static str) -> Result<SecretString> {
    let value = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt)).await??;
    Ok(SecretString::new(value))
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn category_label(tree: &CategoryTree, category: Option<CategoryId>) -> String {
    category
        .and_then(|id| tree.path(id).ok())
        .map(|path| path.join("/"))
        .unwrap_or_else(|| "-".to_string())
}

fn tree_lines(tree: &CategoryTree, parent: Option<CategoryId>, depth: usize, out: &mut Vec<String>) {
    for category in tree.children(parent) {
        out.push(format!(
            "{}  {}{}",
            short_id(category.id),
            "  ".repeat(depth),
            category.name
        ));
        tree_lines(tree, Some(category.id), depth + 1, out);
    }
}

/// Find an id by full id, unique id prefix, or case-insensitive exact name
fn resolve(candidates: Vec<(Uuid, String)>, key: &str, what: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(key) {
        if candidates.iter().any(|(c, _)| *c == id) {
            return Ok(id);
        }
    }

    let prefix = key.to_ascii_lowercase().replace('-', "");
    let by_prefix: Vec<Uuid> = if prefix.is_empty() {
        Vec::new()
    } else {
        candidates
            .iter()
            .filter(|(id, _)| id.simple().to_string().starts_with(&prefix))
            .map(|(id, _)| *id)
            .collect()
    };
    let by_name: Vec<Uuid> = candidates
        .iter()
        .filter(|(_, name)| name.eq_ignore_ascii_case(key))
        .map(|(id, _)| *id)
        .collect();

    match (by_prefix.as_slice(), by_name.as_slice()) {
        ([id], _) => Ok(*id),
        ([], [id]) => Ok(*id),
        ([], []) => bail!("no {} matches '{}'", what, key),
        _ => bail!("'{}' matches more than one {}, use a longer id", key, what),
    }
}
