use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use const_format::concatcp;
use rand::seq::SliceRandom;
use reqwest::blocking::{Client, Response};
use reqwest::{redirect, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::ops::{AddAssign, Div};
use std::process::{self, Child, Command, Stdio};
use std::thread;
use std::time::{Duration as StdDuration, Instant};

const LOCAL_PORT: u32 = 8374;
const LOCAL_URL: &str = concatcp!("http://127.0.0.1:", LOCAL_PORT);
const LOCAL_ADMIN_TOKEN: &str = "benchmark-admin-token";

#[rustfmt::skip]
const ROCKET_ENV: &[(&str, &str)] = &[
    ("ROCKET_PORT", concatcp!(LOCAL_PORT)),
    ("ROCKET_STORE", "memory"),
    ("ROCKET_ADMIN_TOKEN", LOCAL_ADMIN_TOKEN),
];

#[rustfmt::skip]
const CHOICES: &[&str] = &[
    "Alice",
    "Bob",
    "Carol",
    "Dave",
    "Eve",
    "Fred",
    "Grace",
    "Henry",
    "Irene",
    "Joe",
];

#[derive(Parser)]
struct Args {
    /// Silence local server logging.
    #[arg(short, long)]
    quiet: bool,

    /// Send local server logging to this file; takes precedence over --quiet.
    #[arg(long)]
    logfile: Option<String>,

    /// Connect to a remote server at this URL instead of running a local one.
    #[arg(long, requires = "admin_token")]
    remote: Option<String>,

    /// Admin token of the remote server.
    #[arg(long)]
    admin_token: Option<String>,

    /// How many threads to use. Defaults to the number of logical CPUs.
    #[arg(long, default_value_t = num_cpus::get())]
    threads: usize,

    /// How votes are spread across the choices.
    #[arg(long, value_enum, default_value_t)]
    spread: Spread,
}

/// How votes are spread across the choices.
#[derive(Debug, Copy, Clone, ValueEnum)]
enum Spread {
    /// Every vote goes to the first choice.
    Single,
    /// Votes are spread uniformly at random.
    Uniform,
}

impl Spread {
    /// Pick the choice to vote for.
    fn pick<'a>(&self, choices: &'a [u32]) -> Option<&'a u32> {
        match self {
            Self::Single => choices.first(),
            Self::Uniform => choices.choose(&mut rand::thread_rng()),
        }
    }
}

impl Default for Spread {
    fn default() -> Self {
        Self::Uniform
    }
}

/// Construct a URL from segments.
macro_rules! url {
    ($($segment:expr),+) => {{
        std::path::PathBuf::from_iter([$($segment),+]).to_str().unwrap()
    }}
}

/// Set up everything we need before starting the server.
fn setup_deps() -> anyhow::Result<()> {
    // Ensure the optimised build is up-to-date.
    Command::new("cargo")
        .args(["build", "--release", "--bin", "polls-backend"])
        .status()?
        .success()
        .then_some(())
        .ok_or_else(|| anyhow!("server build exited nonzero"))?;

    // Run against the in-memory store so no database is needed.
    for (var, val) in ROCKET_ENV {
        env::set_var(var, val);
    }

    Ok(())
}

/// Terminate the given child process. This is a SIGTERM on unix and a hard-kill on other
/// platforms.
fn terminate_child(child: &mut Child) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let pid = nix::unistd::Pid::from_raw(child.id() as i32);
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM)?;
    }
    #[cfg(not(unix))]
    {
        child.kill()?;
    }
    Ok(())
}

/// Start the server and wait until it answers.
fn launch_server(logfile: Stdio) -> anyhow::Result<Child> {
    let mut proc = Command::new("./target/release/polls-backend")
        .stdout(logfile)
        .spawn()?;

    // Wait for the server to be reachable.
    let client = Client::new();
    loop {
        let resp = client
            .get(url!(LOCAL_URL, "polls"))
            .send()
            .and_then(Response::error_for_status);

        if resp.is_ok() {
            break;
        }

        // Check the server didn't exit.
        if let Some(retcode) = proc.try_wait()? {
            return Err(anyhow!("Server exited prematurely with code {}", retcode));
        }
        thread::sleep(StdDuration::from_millis(100));
    }

    Ok(proc)
}

#[derive(Debug, Deserialize)]
struct ChoiceResult {
    id: u32,
    votes: u32,
}

#[derive(Debug, Deserialize)]
struct QuestionResult {
    id: u32,
    choices: Vec<ChoiceResult>,
}

/// Create a question to benchmark against and return its ID and choice IDs.
fn setup_question(url: &str, admin_token: &str) -> anyhow::Result<(String, Vec<u32>)> {
    let client = Client::new();

    let question = json!({
        "question_text": "Benchmark Question",
        "choices": CHOICES,
    });
    let resp = client
        .post(url!(url, "admin/questions"))
        .bearer_auth(admin_token)
        .json(&question)
        .send()
        .and_then(Response::error_for_status)?;

    let QuestionResult { id, choices } = resp.json()?;
    Ok((id.to_string(), choices.into_iter().map(|c| c.id).collect()))
}

/// Durations of each part of the voting process.
#[derive(Debug, Default)]
struct VoteTimings {
    vote: StdDuration,
    results: StdDuration,
}

impl AddAssign for VoteTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.vote += rhs.vote;
        self.results += rhs.results;
    }
}

impl Div<u32> for VoteTimings {
    type Output = Self;

    fn div(self, rhs: u32) -> Self {
        Self {
            vote: self.vote / rhs,
            results: self.results / rhs,
        }
    }
}

/// Vote for the given choice, then fetch the results as a voter would after the redirect.
fn cast_vote(url: &str, qid: &str, client: &Client, choice: u32) -> anyhow::Result<VoteTimings> {
    let pre_vote = Instant::now();
    let resp = client
        .post(url!(url, "polls", qid, "vote"))
        .form(&[("choice", choice)])
        .send()?;
    let post_vote = Instant::now();
    if resp.status() != StatusCode::SEE_OTHER {
        return Err(anyhow!("vote was not counted: {}", resp.status()));
    }

    let pre_results = Instant::now();
    client
        .get(url!(url, "polls", qid, "results"))
        .send()
        .and_then(Response::error_for_status)?;
    let post_results = Instant::now();

    Ok(VoteTimings {
        vote: post_vote.duration_since(pre_vote),
        results: post_results.duration_since(pre_results),
    })
}

/// Run the benchmark, returning how many votes each choice was sent.
fn benchmark(
    url: &str,
    qid: &str,
    choices: &[u32],
    num_threads: usize,
    spread: Spread,
) -> anyhow::Result<HashMap<u32, u32>> {
    const ITERATIONS_PER_THREAD: usize = 100;
    let end_val: usize = num_threads * ITERATIONS_PER_THREAD;

    let start = Instant::now();
    thread::scope(|s| {
        let mut threads = Vec::with_capacity(num_threads);

        for _ in 0..num_threads {
            let t = s.spawn(move || {
                let client = Client::builder().redirect(redirect::Policy::none()).build()?;
                let mut sent = HashMap::<u32, u32>::new();
                let mut timings = VoteTimings::default();

                for _ in 0..ITERATIONS_PER_THREAD {
                    let choice = *spread
                        .pick(choices)
                        .ok_or_else(|| anyhow!("question has no choices"))?;
                    timings += cast_vote(url, qid, &client, choice)?;
                    *sent.entry(choice).or_default() += 1;
                }

                Ok::<_, anyhow::Error>((timings / ITERATIONS_PER_THREAD as u32, sent))
            });
            threads.push(t);
        }

        let mut timings = VoteTimings::default();
        let mut sent = HashMap::<u32, u32>::new();
        for t in threads {
            let (thread_timings, thread_sent) = t.join().expect("thread panicked")?;
            timings += thread_timings;
            for (choice, count) in thread_sent {
                *sent.entry(choice).or_default() += count;
            }
        }
        let total_duration = start.elapsed();

        let avg = timings / num_threads as u32;
        let avg_total_duration = avg.vote + avg.results;

        // Theoretical votes per sec is 1/avg_duration * num_threads.
        let votes_per_sec = num_threads as f64 / avg_total_duration.as_secs_f64();
        // Actual votes per sec is total_votes / total_time.
        let actual_votes_per_sec = end_val as f64 / total_duration.as_secs_f64();

        println!("vote: {:?}", avg.vote);
        println!("rslt: {:?}", avg.results);

        println!("\ntotal: {:?} ({:.2}/s)", avg_total_duration, votes_per_sec);
        println!(
            "actual duration: {} votes in {:?} ({:.2}/s)",
            end_val, total_duration, actual_votes_per_sec
        );

        Ok(sent)
    })
}

/// Return `Ok(())` if every vote sent was counted exactly once.
fn verify(url: &str, qid: &str, sent: &HashMap<u32, u32>) -> anyhow::Result<()> {
    let results: QuestionResult = Client::new()
        .get(url!(url, "polls", qid, "results"))
        .send()
        .and_then(Response::error_for_status)?
        .json()?;

    for choice in &results.choices {
        let expected = sent.get(&choice.id).copied().unwrap_or_default();
        if choice.votes != expected {
            return Err(anyhow!(
                "question {} choice {}: sent {} votes but {} were counted",
                results.id,
                choice.id,
                expected,
                choice.votes
            ));
        }
    }
    let counted: u32 = results.choices.iter().map(|c| c.votes).sum();
    println!("verified: {counted} votes counted");

    Ok(())
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let url = args.remote.as_deref().unwrap_or(LOCAL_URL);
    let admin_token = args.admin_token.as_deref().unwrap_or(LOCAL_ADMIN_TOKEN);

    // If we're not connecting remotely, bring up a local server.
    let mut proc: Option<Child> = None;
    if args.remote.is_none() {
        setup_deps()?;
        let logfile = match args.logfile {
            Some(path) => Stdio::from(File::create(path)?),
            None => {
                if args.quiet {
                    Stdio::null()
                } else {
                    Stdio::inherit()
                }
            }
        };
        proc = Some(launch_server(logfile)?);
    }

    // Use a closure to ensure the cleanup below runs.
    let result = (|| {
        let (qid, choices) = setup_question(url, admin_token)?;
        let sent = benchmark(url, &qid, &choices, args.threads, args.spread)?;
        verify(url, &qid, &sent)
    })();

    // Kill the server.
    if let Some(p) = proc.as_mut() {
        terminate_child(p)?;
        p.wait()?;
    }

    result
}

fn main() {
    if let Err(e) = run() {
        eprintln!("FATAL: {}", e);
        process::exit(1);
    }
}
