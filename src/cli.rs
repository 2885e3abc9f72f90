use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::api::{InstallTarget, PasswordCredentials, Registration, SteamCredentials};
use crate::console::Console;
use crate::models::{InstallationStatus, Task, TaskStatus};
use crate::notify::Notification;
use crate::poller::PollOutcome;
use crate::router::{Navigation, Route};

#[derive(Debug, Parser)]
#[command(name = "gsm-console", version, about = "Admin console for the game-server manager")]
pub struct Cli {
    /// Backend API root, e.g. http://127.0.0.1:8000/api
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in.
    Login {
        #[command(subcommand)]
        method: LoginMethod,
    },
    /// Create an account and sign in.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Show SteamCMD and server installation status.
    Status,
    /// Inspect and manage download tasks.
    Tasks {
        #[command(subcommand)]
        action: TasksCommand,
    },
    /// Start an installation.
    Install(InstallArgs),
    /// Show where a console path leads for the current session.
    Open { path: String },
}

#[derive(Debug, Subcommand)]
pub enum LoginMethod {
    Steam {
        steam_id: String,
    },
    Password {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum TasksCommand {
    List,
    Show { task_id: String },
    Cancel { task_id: String },
    /// Follow a task until it completes or fails.
    Watch { task_id: String },
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    #[arg(value_enum)]
    pub target: Target,

    #[arg(long, requires = "steam_password")]
    pub steam_username: Option<String>,

    #[arg(long, requires = "steam_username")]
    pub steam_password: Option<String>,

    /// Return once the task has started.
    #[arg(long)]
    pub no_watch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Steamcmd,
    Server,
    Plugins,
    Full,
}

impl From<Target> for InstallTarget {
    fn from(t: Target) -> Self {
        match t {
            Target::Steamcmd => InstallTarget::SteamCmd,
            Target::Server => InstallTarget::Server,
            Target::Plugins => InstallTarget::Plugins,
            Target::Full => InstallTarget::Full,
        }
    }
}

impl Command {
    /// The screen this command belongs to. `None` runs unguarded.
    pub fn route(&self) -> Option<Route> {
        match self {
            Command::Login { .. } | Command::Register { .. } => Some(Route::Login),
            Command::Logout | Command::Open { .. } => None,
            Command::Whoami => Some(Route::Dashboard),
            Command::Status => Some(Route::Servers),
            Command::Tasks { .. } | Command::Install(_) => Some(Route::Downloads),
        }
    }
}

/// Run one command against a started console.
///
/// `Ok(false)` means the action failed and the failure was already reported.
/// `Err` is for commands refused before doing anything.
pub async fn dispatch(console: &mut Console, command: Command) -> Result<bool, String> {
    if let Some(route) = command.route() {
        match console.navigate(route) {
            Navigation::Allow(_) => {}
            Navigation::Redirect(Route::Login) => {
                return Err("not signed in; run `gsm-console login` first".to_string());
            }
            Navigation::Redirect(_) => {
                let name = console
                    .session()
                    .user()
                    .map(|u| u.display_name().to_string())
                    .unwrap_or_default();
                println!("already signed in as {name}");
                return Ok(true);
            }
        }
    }

    let logging_out = matches!(command, Command::Logout);
    let ok = run_command(console, command).await;

    // A stale token rejected by the logout call is not news.
    if console.take_session_expired() && !logging_out {
        console
            .notifier()
            .notify(Notification::error("Session expired, please sign in again"));
        let to = console.current_route();
        eprintln!("redirected to {} ({})", to.name(), to.path());
        return Ok(false);
    }
    Ok(ok)
}

async fn run_command(console: &mut Console, command: Command) -> bool {
    match command {
        Command::Login { method } => {
            let res = match method {
                LoginMethod::Steam { steam_id } => console.session().login_steam(&steam_id).await,
                LoginMethod::Password { email, password } => {
                    console
                        .session()
                        .login_with_password(&PasswordCredentials { email, password })
                        .await
                }
            };
            report_sign_in(console, res.success, res.message)
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let res = console
                .session()
                .register(&Registration {
                    username,
                    email,
                    password,
                })
                .await;
            report_sign_in(console, res.success, res.message)
        }
        Command::Logout => {
            if console.session().is_authenticated() {
                console.session().logout_remote().await;
                console.notifier().notify(Notification::success("Signed out"));
            } else {
                console.session().logout();
                console.notifier().notify(Notification::info("Not signed in"));
            }
            console.navigate(Route::Login);
            true
        }
        Command::Whoami => {
            if !console.session().fetch_current_user().await {
                console
                    .notifier()
                    .notify(Notification::error("Failed to load profile"));
                return false;
            }
            match console.session().user() {
                Some(user) => {
                    println!("{}", user.display_name());
                    if let Some(id) = user.user_id() {
                        println!("  id:       {id}");
                    }
                    if let Some(email) = &user.email {
                        println!("  email:    {email}");
                    }
                    if let Some(steam_id) = &user.steam_id {
                        println!("  steam id: {steam_id}");
                    }
                    if let Some(avatar) = user.avatar_ref() {
                        println!("  avatar:   {avatar}");
                    }
                    println!("  admin:    {}", user.is_admin);
                    true
                }
                None => false,
            }
        }
        Command::Status => match console.tasks().installation_status().await {
            Ok(status) => {
                println!("backend:  {}", console.config().base_url);
                print_installation(&status);
                true
            }
            Err(e) => {
                log::error!("installation status failed: {e}");
                console.notifier().notify(Notification::error(
                    e.user_message("Failed to load installation status"),
                ));
                false
            }
        },
        Command::Tasks { action } => run_tasks(console, action).await,
        Command::Install(args) => run_install(console, args).await,
        Command::Open { path } => match Route::from_path(&path) {
            Some(route) => {
                let nav = console.navigate(route);
                let to = nav.destination();
                match nav {
                    Navigation::Allow(_) => println!("{} ({})", to.name(), to.path()),
                    Navigation::Redirect(_) => {
                        println!("{} redirects to {} ({})", route.path(), to.name(), to.path())
                    }
                }
                true
            }
            None => {
                console
                    .notifier()
                    .notify(Notification::error(format!("No such page: {path}")));
                false
            }
        },
    }
}

fn report_sign_in(console: &mut Console, success: bool, message: Option<String>) -> bool {
    if !success {
        let message = message.unwrap_or_else(|| "Login failed".to_string());
        console.notifier().notify(Notification::error(message));
        return false;
    }
    let name = console
        .session()
        .user()
        .map(|u| u.display_name().to_string())
        .unwrap_or_default();
    console
        .notifier()
        .notify(Notification::success(format!("Signed in as {name}")));
    console.navigate(Route::Root);
    true
}

async fn run_tasks(console: &mut Console, action: TasksCommand) -> bool {
    let tasks = console.tasks().clone();
    match action {
        TasksCommand::List => {
            // Errors are reported by the store.
            if tasks.list_tasks().await.is_err() {
                return false;
            }
            let mut all: Vec<Task> = tasks.tasks().into_values().collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            if all.is_empty() {
                println!("no download tasks");
            }
            for task in &all {
                println!("{}", task_line(task));
            }
            true
        }
        TasksCommand::Show { task_id } => match tasks.get_task(&task_id).await {
            Ok(task) => {
                print_task(&task);
                true
            }
            Err(e) => {
                log::error!("failed to load task {task_id}: {e}");
                console.notifier().notify(
                    Notification::error(e.user_message("Failed to load download task"))
                        .for_task(&task_id),
                );
                false
            }
        },
        TasksCommand::Cancel { task_id } => tasks.cancel_task(&task_id).await.success,
        TasksCommand::Watch { task_id } => {
            match tasks.get_task(&task_id).await {
                Ok(task) if task.status.is_terminal() => {
                    println!("{}", task_line(&task));
                    return task.status == TaskStatus::Completed;
                }
                Ok(task) => println!("{}", task_line(&task)),
                Err(e) => {
                    console.notifier().notify(
                        Notification::error(e.user_message("Failed to load download task"))
                            .for_task(&task_id),
                    );
                    return false;
                }
            }
            tasks.poll_task(&task_id);
            watch(console, &task_id).await
        }
    }
}

async fn run_install(console: &mut Console, args: InstallArgs) -> bool {
    let credentials = match (args.steam_username, args.steam_password) {
        (Some(username), Some(password)) => Some(SteamCredentials { username, password }),
        _ => None,
    };
    let target = InstallTarget::from(args.target);
    let result = console.tasks().install(target, credentials.as_ref()).await;
    if !result.success {
        return false;
    }

    match result.task_id {
        Some(task_id) if !args.no_watch => {
            println!("watching task {task_id}");
            watch(console, &task_id).await
        }
        Some(task_id) => {
            println!("started task {task_id}");
            true
        }
        None => true,
    }
}

async fn watch(console: &Console, task_id: &str) -> bool {
    let tasks = console.tasks();
    match tasks.wait_for_poll(task_id).await {
        Some(PollOutcome::Terminal(status)) => status == TaskStatus::Completed,
        Some(PollOutcome::TimedOut) => {
            console.notifier().notify(
                Notification::info(format!(
                    "Stopped watching after {}s; the task may still be running",
                    tasks.poll_settings().timeout.as_secs()
                ))
                .for_task(task_id),
            );
            true
        }
        Some(PollOutcome::Failed(e)) => {
            eprintln!("lost track of {task_id}: {e}");
            false
        }
        Some(PollOutcome::Cancelled) | None => true,
    }
}

fn task_line(task: &Task) -> String {
    let progress = task
        .progress
        .map(|p| format!("{p:>5.1}%"))
        .unwrap_or_else(|| "     -".to_string());
    format!("{:<28} {:<9} {progress}  {}", task.id, task.status.as_str(), task.description)
}

fn print_task(task: &Task) {
    println!("{}", task_line(task));
    if let Some(kind) = &task.task_type {
        println!("  type:       {kind}");
    }
    if let (Some(done), Some(total)) = (task.downloaded_size, task.total_size) {
        println!("  downloaded: {done}/{total} bytes");
    }
    if let Some(start) = &task.start_time {
        println!("  started:    {start}");
    }
    if let Some(end) = &task.end_time {
        println!("  finished:   {end}");
    }
    if let Some(message) = task.message.as_deref().filter(|m| !m.is_empty()) {
        println!("  message:    {message}");
    }
}

fn print_installation(status: &InstallationStatus) {
    let mark = |b: bool| if b { "installed" } else { "missing" };
    println!("steamcmd: {}", mark(status.steamcmd_installed));
    if !status.steamcmd_path.is_empty() {
        println!("  path:   {}", status.steamcmd_path);
    }
    println!("server:   {}", mark(status.server_installed));
    if !status.server_path.is_empty() {
        println!("  path:   {}", status.server_path);
    }
}
