//! Parsing of the interactive command line

use anyhow::{anyhow, bail, Result};

pub const HELP: &str = "\
Commands:
  list                              List all entries
  search <text> [--category <cat>]  Search titles, usernames and URLs
  show <id>                         Show an entry (password hidden)
  add                               Create an entry
  edit <id>                         Edit an entry
  rm <id>                           Delete an entry
  history <id>                      List earlier versions of an entry
  restore <id> <n>                  Make version <n> current again
  copy <id>                         Copy a password to the clipboard
  gen [len]                         Generate a password
  cats                              Show the category tree
  mkcat <name> [parent]             Create a category
  rencat <cat> <name>               Rename a category
  mvcat <cat> <parent|root>         Move a category
  rmcat <cat>                       Delete a category
  lock                              Lock the vault
  unlock                            Unlock the vault
  passwd                            Change the master password
  logout                            Sign out and exit
  quit                              Exit";

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Search {
        text: String,
        category: Option<String>,
    },
    Show(String),
    Add,
    Edit(String),
    Remove(String),
    History(String),
    Restore {
        entry: String,
        version: usize,
    },
    Copy(String),
    Generate(Option<usize>),
    Categories,
    MakeCategory {
        name: String,
        parent: Option<String>,
    },
    RenameCategory {
        category: String,
        name: String,
    },
    /// `parent: None` moves to the root
    MoveCategory {
        category: String,
        parent: Option<String>,
    },
    RemoveCategory(String),
    Lock,
    Unlock,
    ChangePassword,
    Logout,
    Help,
    Quit,
}

impl Command {
    /// Parse a command line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match name {
            "list" | "ls" => Command::List,
            "search" | "find" => parse_search(&args)?,
            "show" => Command::Show(one_arg(name, &args)?),
            "add" | "new" => Command::Add,
            "edit" => Command::Edit(one_arg(name, &args)?),
            "rm" | "delete" => Command::Remove(one_arg(name, &args)?),
            "history" => Command::History(one_arg(name, &args)?),
            "restore" => match args.as_slice() {
                [entry, version] => Command::Restore {
                    entry: entry.to_string(),
                    version: version
                        .parse()
                        .map_err(|_| anyhow!("version must be a number, got '{}'", version))?,
                },
                _ => bail!("usage: restore <id> <n>"),
            },
            "copy" | "cp" => Command::Copy(one_arg(name, &args)?),
            "gen" => match args.as_slice() {
                [] => Command::Generate(None),
                [len] => Command::Generate(Some(
                    len.parse()
                        .map_err(|_| anyhow!("length must be a number, got '{}'", len))?,
                )),
                _ => bail!("usage: gen [len]"),
            },
            "cats" => Command::Categories,
            "mkcat" => match args.as_slice() {
                [name] => Command::MakeCategory {
                    name: name.to_string(),
                    parent: None,
                },
                [name, parent] => Command::MakeCategory {
                    name: name.to_string(),
                    parent: Some(parent.to_string()),
                },
                _ => bail!("usage: mkcat <name> [parent]"),
            },
            "rencat" => match args.as_slice() {
                [category, rest @ ..] if !rest.is_empty() => Command::RenameCategory {
                    category: category.to_string(),
                    name: rest.join(" "),
                },
                _ => bail!("usage: rencat <cat> <name>"),
            },
            "mvcat" => match args.as_slice() {
                [category, parent] => Command::MoveCategory {
                    category: category.to_string(),
                    parent: (*parent != "root").then(|| parent.to_string()),
                },
                _ => bail!("usage: mvcat <cat> <parent|root>"),
            },
            "rmcat" => Command::RemoveCategory(one_arg(name, &args)?),
            "lock" => Command::Lock,
            "unlock" => Command::Unlock,
            "passwd" => Command::ChangePassword,
            "logout" => Command::Logout,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("unknown command '{}', type 'help' for a list", other),
        };
        Ok(Some(command))
    }
}

fn one_arg(name: &str, args: &[&str]) -> Result<String> {
    match args {
        [arg] => Ok(arg.to_string()),
        _ => bail!("usage: {} <id>", name),
    }
}

fn parse_search(args: &[&str]) -> Result<Command> {
    let mut text = Vec::new();
    let mut category = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == "--category" || *arg == "-c" {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("--category needs a value"))?;
            category = Some(value.to_string());
        } else {
            text.push(*arg);
        }
    }

    Ok(Command::Search {
        text: text.join(" "),
        category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line_is_no_command() {
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_search_with_category() {
        assert_eq!(
            parse("search git hub --category work"),
            Command::Search {
                text: "git hub".to_string(),
                category: Some("work".to_string())
            }
        );
        assert!(Command::parse("search x --category").is_err());
    }

    #[test]
    fn test_move_to_root() {
        assert_eq!(
            parse("mvcat abc root"),
            Command::MoveCategory {
                category: "abc".to_string(),
                parent: None
            }
        );
        assert_eq!(
            parse("mvcat abc def"),
            Command::MoveCategory {
                category: "abc".to_string(),
                parent: Some("def".to_string())
            }
        );
    }

    #[test]
    fn test_numeric_arguments() {
        assert_eq!(parse("gen"), Command::Generate(None));
        assert_eq!(parse("gen 24"), Command::Generate(Some(24)));
        assert!(Command::parse("gen long").is_err());
        assert_eq!(
            parse("restore 1a2b 0"),
            Command::Restore {
                entry: "1a2b".to_string(),
                version: 0
            }
        );
    }

    #[test]
    fn test_rename_keeps_spaces() {
        assert_eq!(
            parse("rencat 1a2b Side projects"),
            Command::RenameCategory {
                category: "1a2b".to_string(),
                name: "Side projects".to_string()
            }
        );
    }

    #[test]
    fn test_missing_and_unknown() {
        assert!(Command::parse("show").is_err());
        assert!(Command::parse("show a b").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }
}
