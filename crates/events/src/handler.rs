/// Execute an aggregate command in place: decide, then apply each event.
///
/// No persistence and no publication; the infra `CommandDispatcher` owns that
/// pipeline. Handy for tests and for replaying a command against loaded state.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: medprocure_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
