mod inbound_tests;
